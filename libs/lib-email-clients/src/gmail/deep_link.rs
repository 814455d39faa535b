use url::form_urlencoded;

const GMAIL_WEB_BASE: &str = "https://mail.google.com/mail/u/0/";

/// Link that opens a message in the Gmail web client.
///
/// Gmail has no stable per-message URL, so the link is a search. The
/// RFC 822 `Message-ID` header is unique per message and is preferred;
/// without it the link falls back to the API message id, which the web
/// client also resolves.
pub fn message_deep_link(message_id: &str, rfc822_message_id: Option<&str>) -> String {
    match rfc822_message_id.map(|id| id.trim().trim_matches(&['<', '>'][..])) {
        Some(rfc_id) if !rfc_id.is_empty() => {
            let query: String =
                form_urlencoded::byte_serialize(format!("rfc822msgid:{rfc_id}").as_bytes())
                    .collect();
            format!("{GMAIL_WEB_BASE}#search/{query}")
        }
        _ => format!("{GMAIL_WEB_BASE}#all/{message_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_link_uses_rfc822_id() {
        let link = message_deep_link("18f0a", Some("<abc.123@mail.example.com>"));
        assert_eq!(
            link,
            "https://mail.google.com/mail/u/0/#search/rfc822msgid%3Aabc.123%40mail.example.com"
        );
    }

    #[test]
    fn test_deep_link_falls_back_to_message_id() {
        assert_eq!(
            message_deep_link("18f0a", None),
            "https://mail.google.com/mail/u/0/#all/18f0a"
        );
        assert_eq!(
            message_deep_link("18f0a", Some("  ")),
            "https://mail.google.com/mail/u/0/#all/18f0a"
        );
    }
}
