use indoc::formatdoc;

use crate::prompt::{Completer, GenerationParams, UsageRecord};
use crate::util::truncate_chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub include: bool,
    pub reason: String,
}

#[derive(Debug)]
pub struct ClassifyOutcome {
    pub classification: Classification,
    pub usage: Option<UsageRecord>,
}

pub fn classification_prompt(subject: &str, sender: &str, body: &str) -> String {
    formatdoc! {r#"
        You are an expert email assistant helping curate a weekly newsletter summary for a tech/product/VC leader.
        Given the following email, answer these two questions:
        1. Should this email be included in a weekly newsletter post about technology, AI, product management, growth, stock market, politics, or venture capital?
           - Include if it is a thought leadership, analysis, or curated content newsletter (e.g., Stratechery, Lenny's, a16z, Adam Grant, Chartr, The Information, The Block, Newcomer, Sequoia, Y Combinator).
           - Exclude if it is a transactional alert (e.g., payment receipts, price alerts, brokerage notifications), a job alert, a product update, a LinkedIn message or event invite, a generic news digest without deep tech/VC/PM/AI analysis, an interview prep community, or any other notification.
        2. Explain your reasoning in 1-2 sentences.

        Email details:
        Subject: {subject}
        Sender: {sender}
        Body: {body}

        Respond in this format:
        Reason: [your reasoning]
        Include: [yes/no]"#}
}

/// The first line mentioning `include:` decides; anything else excludes.
pub fn parse_classification(text: &str) -> Classification {
    let include = text
        .lines()
        .map(str::to_lowercase)
        .find(|line| line.contains("include:"))
        .is_some_and(|line| line.contains("yes"));

    let reason = text
        .lines()
        .find_map(|line| {
            line.to_lowercase()
                .find("reason:")
                .and_then(|idx| line.get(idx + "reason:".len()..))
                .map(|reason| reason.trim().to_string())
        })
        .unwrap_or_else(|| text.trim().to_string());

    Classification { include, reason }
}

pub async fn classify(
    completer: &impl Completer,
    subject: &str,
    sender: &str,
    body: &str,
    body_chars: usize,
    params: GenerationParams,
) -> ClassifyOutcome {
    let prompt = classification_prompt(subject, sender, truncate_chars(body, body_chars));
    let completion = completer.complete(&prompt, params).await;

    let classification = match completion.usable_text() {
        Some(text) => parse_classification(text),
        None => Classification {
            include: false,
            reason: completion.text.clone(),
        },
    };

    ClassifyOutcome {
        classification,
        usage: completion.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompleter;

    const PARAMS: GenerationParams = GenerationParams {
        max_output_units: 200,
        temperature: 0.0,
    };

    #[test]
    fn test_prompt_contains_email_and_format() {
        let prompt = classification_prompt("Weekly AI", "Lenny <l@x.com>", "Body text");
        assert!(prompt.contains("Subject: Weekly AI\n"));
        assert!(prompt.contains("Sender: Lenny <l@x.com>\n"));
        assert!(prompt.contains("Body: Body text\n"));
        assert!(prompt.ends_with("Reason: [your reasoning]\nInclude: [yes/no]"));
    }

    #[test]
    fn test_parse_yes() {
        let parsed = parse_classification("Reason: Deep analysis of AI chips.\nInclude: Yes");
        assert!(parsed.include);
        assert_eq!(parsed.reason, "Deep analysis of AI chips.");
    }

    #[test]
    fn test_parse_uses_first_include_line() {
        let parsed = parse_classification("INCLUDE: no\nInclude: yes");
        assert!(!parsed.include);
    }

    #[test]
    fn test_parse_missing_marker_excludes() {
        let parsed = parse_classification("Yes, this looks great.");
        assert!(!parsed.include);
        assert_eq!(parsed.reason, "Yes, this looks great.");
    }

    #[tokio::test]
    async fn test_sentinels_exclude() {
        for reply in ["[Error: timed out]", "[No response]"] {
            let completer = ScriptedCompleter::new().otherwise(reply);
            let outcome = classify(&completer, "s", "f", "b", 2000, PARAMS).await;
            assert!(!outcome.classification.include, "{reply} must exclude");
            assert!(outcome.usage.is_none());
        }
    }

    #[tokio::test]
    async fn test_body_is_truncated() {
        let completer = ScriptedCompleter::new().otherwise("Include: yes");
        let body = format!("{}{}", "a".repeat(50), "TAIL");

        let outcome = classify(&completer, "s", "f", &body, 50, PARAMS).await;

        assert!(outcome.classification.include);
        assert!(outcome.usage.is_some());
        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("TAIL"));
    }
}
