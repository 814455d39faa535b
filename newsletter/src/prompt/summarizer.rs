use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prompt::{Completer, GenerationParams, UsageRecord};
use crate::util::truncate_chars;

pub const BULLETS_PER_MESSAGE: usize = 3;

static RE_LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•·]|\d{1,2}[.)])\s+").unwrap());

#[derive(Debug)]
pub struct SummaryOutcome {
    pub bullet_block: String,
    pub usage: Option<UsageRecord>,
}

pub fn summary_prompt(subject: &str, sender: &str, body: &str, message_id: &str) -> String {
    formatdoc! {r#"
        Summarize the following newsletter email into exactly {count} bullet points for a weekly digest read by a tech/product/VC leader.
        Rules:
        - Put each bullet on its own line.
        - Start every bullet with a short bolded lead-in phrase followed by a colon, e.g. <b>Chip supply tightens:</b> then one or two sentences of explanation.
        - Do not use emoji.
        - Do not number the bullets and do not prefix them with "Point 1:", "Point 2:" or similar.
        - Do not add an introduction or a closing line.

        Email ID: {message_id}
        Subject: {subject}
        Sender: {sender}
        Body: {body}"#,
        count = BULLETS_PER_MESSAGE,
    }
}

/// Non-empty lines of a bullet block with list markers removed.
pub fn bullet_lines(block: &str) -> Vec<String> {
    block
        .lines()
        .map(|line| RE_LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// A sentinel reply yields an empty block, so the message contributes no
/// bullets and no links.
pub async fn summarize_bullets(
    completer: &impl Completer,
    subject: &str,
    sender: &str,
    body: &str,
    message_id: &str,
    body_chars: usize,
    params: GenerationParams,
) -> SummaryOutcome {
    let prompt = summary_prompt(subject, sender, truncate_chars(body, body_chars), message_id);
    let completion = completer.complete(&prompt, params).await;

    let bullet_block = match completion.usable_text() {
        Some(text) => text.to_string(),
        None => {
            tracing::warn!(
                "No summary for message {} ({}): {}",
                message_id,
                subject,
                completion.text
            );
            String::new()
        }
    };

    SummaryOutcome {
        bullet_block,
        usage: completion.usage,
    }
}
