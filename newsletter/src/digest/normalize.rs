//! Model-free cleanup of the synthesized newsletter.
//!
//! The enhancement model is told to keep the structure intact, but it
//! still wraps output in code fences, invents links and re-bolds things.
//! [`normalize`] undoes all of that and puts the verified "Read more" links
//! back, one tail per `<li>` in document order.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Sentences models like to open the digest with.
pub const BOILERPLATE_SENTENCES: &[&str] = &[
    "Here is your weekly newsletter digest.",
    "Here's your weekly newsletter digest:",
    "Here is the enhanced newsletter:",
    "Here is the revised newsletter:",
];

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").unwrap());
static RE_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = BOILERPLATE_SENTENCES
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)(?:{alternatives})")).unwrap()
});
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a\s*>").unwrap());
static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<li\b([^>]*)>(.*?)</li\s*>").unwrap());
static RE_LEADING_BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^<(?:b|strong)\b[^>]*>(.*?)</(?:b|strong)\s*>").unwrap());
static RE_LEADING_MD_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\*\*(.*?)\*\*").unwrap());
static RE_LEADING_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:#+|\*\*)\s*").unwrap());
static RE_READ_MORE_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*read more\s+here(?:\s*(?:,|\band\b)\s*here)*\s*\.?\s*$").unwrap()
});
static RE_LEADING_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0F}\x{200D}•·▪◦‣–—-]\s*)+")
        .unwrap()
});
static RE_LEADING_GLYPHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0F}\x{200D}•·▪◦‣*–—-]\s*)+")
        .unwrap()
});

/// `" Read more <a href=\"a\">here</a>, <a href=\"b\">here</a> and <a href=\"c\">here</a>."`
pub fn read_more_tail(links: &[String]) -> String {
    let anchors: Vec<String> = links
        .iter()
        .map(|link| format!(r#"<a href="{link}">here</a>"#))
        .collect();

    match anchors.split_last() {
        None => String::new(),
        Some((only, [])) => format!(" Read more {only}."),
        Some((last, rest)) => format!(" Read more {} and {last}.", rest.join(", ")),
    }
}

/// Runs every cleanup step over `html`. `link_lists[i]` supplies the
/// "here" anchors of the i-th `<li>`; bullets past the end of
/// `link_lists` get no tail.
pub fn normalize(html: &str, link_lists: &[Vec<String>]) -> String {
    let html = strip_artifacts(html);
    let html = unwrap_anchors(&html);

    let bullet_count = RE_LIST_ITEM.find_iter(&html).count();
    if bullet_count != link_lists.len() {
        tracing::warn!(
            "Bullet/link desync: {} <li> element(s) but {} link list(s); extra bullets get no links",
            bullet_count,
            link_lists.len()
        );
    }

    let mut index = 0;
    let normalized = RE_LIST_ITEM.replace_all(&html, |caps: &Captures| {
        let i = index;
        index += 1;

        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let raw = caps.get(2).map_or("", |m| m.as_str());
        if raw.to_ascii_lowercase().contains("<li") {
            tracing::warn!("Nested <li> in bullet {}, links after it will shift", i + 1);
        }
        let body = clean_bullet(raw);
        let body = bold_lead_phrase(&body);
        let tail = link_lists
            .get(i)
            .map(|links| read_more_tail(links))
            .unwrap_or_default();

        format!("<li{attrs}>{body}{tail}</li>")
    });

    normalized.trim().to_string()
}

fn strip_artifacts(html: &str) -> String {
    let html = RE_FENCE.replace_all(html, "");
    RE_BOILERPLATE.replace_all(&html, "").into_owned()
}

fn unwrap_anchors(html: &str) -> String {
    RE_ANCHOR.replace_all(html, "$1").into_owned()
}

/// Leading emoji, bold and heading markers come off, as does a trailing
/// "Read more here" left by an earlier pass.
fn clean_bullet(body: &str) -> String {
    let body = RE_LEADING_EMOJI.replace(body.trim_start(), "");
    let body = RE_LEADING_BOLD.replace(&body, "$1");
    let body = RE_LEADING_MD_BOLD.replace(&body, "$1");
    let body = RE_LEADING_HEADING.replace(&body, "");
    let body = RE_READ_MORE_TAIL.replace(body.trim_start(), "");
    body.trim().to_string()
}

fn bold_lead_phrase(body: &str) -> String {
    let body = RE_LEADING_GLYPHS.replace(body, "");
    match body.find(':') {
        Some(idx) => {
            let (lead, rest) = body.split_at(idx + 1);
            format!("<strong>{}</strong>{}", lead.trim(), rest)
        }
        None => body.into_owned(),
    }
}
