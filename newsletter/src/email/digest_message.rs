use std::borrow::Cow;

use anyhow::Context;
use lib_email_clients::gmail::deep_link::message_deep_link;
use mail_parser::MessageParser;
use regex::Regex;

use crate::digest::grouping::sender_display_name;
use crate::util::truncate_chars;

const RE_WHITESPACE_STR: &str = r"[\r\t\n]+";
const RE_LONG_SPACE_STR: &str = r" {2,}";
const RE_DIVIDERS_STR: &str = r"[-=_]{3,}";
const RE_HTTP_LINK_STR: &str = r"https?:\/\/(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&//=]*)";
const RE_IMG_TAG_STR: &str = r#"<img[^>]*alt=["']([^"']*)["'][^>]*/?>"#;
const RE_SANITIZE_STR: &str = r"(?is)<!--[\s\S]*?-->|<script[\s\S]*?</script>|<style[\s\S]*?</style>";
const RE_FOOTER_STR: &str = r"(?i)(^|\s)(unsubscribe|opt[- ]?out|manage\s+(your\s+)?(email\s+)?preferences|email\s+preferences|update\s+(your\s+)?preferences|privacy\s+policy|all\s+rights\s+reserved|©\s*\d{4}|you('re|\s+are)\s+(receiving|getting)\s+this\s+(email|message|because))";

pub const NO_SUBJECT: &str = "(No Subject)";
pub const NO_SENDER: &str = "(No Sender)";
pub const NO_BODY: &str = "(No body)";

lazy_static::lazy_static!(
    static ref RE_WHITESPACE: Regex = Regex::new(RE_WHITESPACE_STR).unwrap();
    static ref RE_LONG_SPACE: Regex = Regex::new(RE_LONG_SPACE_STR).unwrap();
    static ref RE_DIVIDERS: Regex = Regex::new(RE_DIVIDERS_STR).unwrap();
    static ref RE_HTTP_LINK: Regex = Regex::new(RE_HTTP_LINK_STR).unwrap();
    static ref RE_IMG_TAG: Regex = Regex::new(RE_IMG_TAG_STR).unwrap();
    static ref RE_SANITIZE: Regex = Regex::new(RE_SANITIZE_STR).unwrap();
    static ref RE_FOOTER: Regex = Regex::new(RE_FOOTER_STR).unwrap();
);

/// A fetched email reduced to what the digest pipeline reads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DigestMessage {
    pub id: String,
    pub thread_id: String,
    pub internal_date: i64,
    /// Raw `From` header in `Name <address>` form.
    pub from: String,
    pub sender_name: String,
    pub subject: String,
    /// Plain text, or the Gmail snippet when no body could be extracted.
    pub body: String,
    pub snippet: Option<String>,
    pub rfc822_message_id: Option<String>,
}

impl DigestMessage {
    pub fn new(
        id: String,
        from: String,
        subject: String,
        body: String,
        internal_date: i64,
    ) -> Self {
        Self {
            sender_name: sender_display_name(&from),
            id,
            from,
            subject,
            body,
            internal_date,
            ..Default::default()
        }
    }

    pub fn from_gmail_message(msg: google_gmail1::api::Message) -> anyhow::Result<Self> {
        let id = msg.id.clone().context("Message missing id")?;
        let thread_id = msg.thread_id.clone().unwrap_or_default();
        let internal_date = msg.internal_date.unwrap_or_default();
        let snippet = msg.snippet.clone().filter(|s| !s.trim().is_empty());

        let raw = msg.raw.as_ref().context(format!(
            "No raw message found in message response for {}",
            id
        ))?;
        let Extracted {
            from,
            subject,
            body,
            rfc822_message_id,
        } = MessageParser::default()
            .parse(raw)
            .map_or(Extracted::default(), extract_text);

        let from = from.unwrap_or_else(|| NO_SENDER.to_string());
        let body = body
            .filter(|b| !b.trim().is_empty())
            .or_else(|| snippet.clone())
            .unwrap_or_else(|| NO_BODY.to_string());

        Ok(DigestMessage {
            sender_name: sender_display_name(&from),
            id,
            thread_id,
            internal_date,
            from,
            subject: subject.unwrap_or_else(|| NO_SUBJECT.to_string()),
            body,
            snippet,
            rfc822_message_id,
        })
    }

    pub fn deep_link(&self) -> String {
        message_deep_link(&self.id, self.rfc822_message_id.as_deref())
    }

    pub fn snippet_prefix(&self, max_chars: usize) -> &str {
        truncate_chars(&self.body, max_chars)
    }
}

#[derive(Debug, Default)]
struct Extracted {
    from: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    rfc822_message_id: Option<String>,
}

fn extract_text(msg: mail_parser::Message) -> Extracted {
    let from = msg.from().and_then(|f| f.first()).and_then(|addr| {
        let address = addr.address()?;
        Some(match addr.name() {
            Some(name) => format!("{} <{}>", name, address),
            None => address.to_string(),
        })
    });

    let subject = msg
        .subject()
        .map(|s| {
            let s = RE_WHITESPACE.replace_all(s, " ");
            let s = RE_LONG_SPACE.replace_all(&s, " ");
            s.trim().to_string()
        })
        .filter(|s| !s.is_empty());

    let body = msg
        .body_html(0)
        .or_else(|| msg.body_text(0))
        .map(|b| plain_text(&b));

    Extracted {
        from,
        subject,
        body,
        rfc822_message_id: msg.message_id().map(|id| id.to_string()),
    }
}

/// Flatten an email body to a single line of readable text.
pub fn plain_text(body: &str) -> String {
    let b = RE_SANITIZE.replace_all(body, "");
    let b = replace_images(&b);
    let b: String = html2text::from_read(b.as_bytes(), 400);
    let b = RE_HTTP_LINK.replace_all(&b, "[LINK]");
    let b = RE_WHITESPACE.replace_all(&b, " ");
    let b = RE_DIVIDERS.replace_all(&b, " ");
    let b = RE_LONG_SPACE.replace_all(&b, " ");
    strip_footer(b.trim()).to_string()
}

fn replace_images(body: &str) -> Cow<'_, str> {
    RE_IMG_TAG.replace_all(body, "[An image of $1]")
}

/// Newsletters often open with "view in browser" or "unsubscribe" banners,
/// so only a match in the second half of the text counts as a footer.
fn strip_footer(body: &str) -> &str {
    let half = body.len() / 2;
    match RE_FOOTER.find_iter(body).find(|m| m.start() >= half) {
        Some(m) => body[..m.start()].trim_end(),
        None => body,
    }
}
