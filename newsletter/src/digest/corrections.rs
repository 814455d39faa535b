use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::prompt::link_qa::Correction;

static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>.*?</li\s*>").unwrap());
static RE_HERE_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b[^>]*>\s*here\s*</a\s*>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Retargets the "here" anchors of every bullet whose visible text contains
/// a correction's bullet summary. Returns the rewritten document and the
/// number of bullet rewrites performed.
///
/// Matching is by substring, so one correction can rewrite several
/// bullets. Corrections naming a subject missing from `subject_links` are
/// skipped.
pub fn apply_corrections(
    html: &str,
    corrections: &[Correction],
    subject_links: &IndexMap<String, String>,
) -> (String, usize) {
    let mut html = html.to_string();
    let mut rewritten = 0;

    for correction in corrections {
        let Some(link) = subject_links.get(&correction.correct_subject) else {
            tracing::warn!(
                "Skipping correction for {:?}: no email with subject {:?}",
                correction.bullet_summary,
                correction.correct_subject
            );
            continue;
        };

        let mut matched = 0;
        html = RE_LIST_ITEM
            .replace_all(&html, |caps: &Captures| {
                let item = &caps[0];
                if !visible_text(item).contains(&correction.bullet_summary) {
                    return item.to_string();
                }
                matched += 1;
                let anchor = format!(r#"<a href="{link}">here</a>"#);
                RE_HERE_ANCHOR
                    .replace_all(item, regex::NoExpand(&anchor))
                    .into_owned()
            })
            .into_owned();

        if matched == 0 {
            tracing::warn!(
                "Correction for {:?} matched no bullet",
                correction.bullet_summary
            );
        } else {
            tracing::info!(
                "Relinked {} bullet(s) matching {:?} to {:?}",
                matched,
                correction.bullet_summary,
                correction.correct_subject
            );
        }
        rewritten += matched;
    }

    (html, rewritten)
}

/// Tag-stripped, entity-decoded text of one `<li>` match.
fn visible_text(item: &str) -> String {
    let inner = item.get(3..).unwrap_or_default();
    if inner.to_ascii_lowercase().contains("<li") {
        tracing::warn!("Nested <li> in digest, bullet text may be cut short: {:?}", item);
    }
    let text = RE_TAG.replace_all(item, "");
    html_escape::decode_html_entities(&text).into_owned()
}
