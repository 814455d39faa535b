//! Narrative synthesis and the review pass that deepens it.
//!
//! Both stages are best effort: whatever goes wrong, the caller gets a
//! usable document back, tagged as [`StageOutcome::Fallback`].

use indoc::formatdoc;

use crate::prompt::{Completer, GenerationParams, StageOutcome, UsageRecord};

#[derive(Debug)]
pub struct StageResult {
    pub document: StageOutcome<String>,
    pub usage: Option<UsageRecord>,
}

pub fn synthesis_prompt(bullet_document: &str) -> String {
    formatdoc! {r#"
        You are the editor of a weekly newsletter for a tech/product/VC leader.
        Turn the bullet summaries below into one engaging, well-structured HTML newsletter.

        Formatting rules:
        - Exactly one <h1> title at the top.
        - One <h2> heading per topic group, in the same order as the groups below.
        - Under each <h2>, an unordered list (<ul>) with one <li> per bullet. Keep every bullet and do not merge or split them.
        - Start each <li> with the bolded lead-in phrase followed by a colon.
        - Separate sections with a <br> so the email breathes.
        - Use relevant emoji liberally in headings and bullets where they add context.
        - Do not add links, a sign-off, a signature, or any "Best regards" line.
        - Output only the HTML, without code fences or commentary.

        Bullet summaries:
        {bullet_document}"#}
}

pub fn enhancement_prompt(synthesized: &str, bullet_document: &str) -> String {
    formatdoc! {r#"
        You are a senior editor reviewing a draft weekly newsletter.
        Improve the draft below by adding explanatory depth: for each bullet, add a sentence of context on why it matters or what it implies, using only facts from the original summaries.

        Strict rules:
        - Keep the exact HTML structure: the same <h1>, the same <h2> sections in the same order, and the same number of <li> items in each list.
        - Keep each bolded lead-in phrase and its colon at the start of its <li>.
        - Keep any existing links exactly as they are and do not add new ones.
        - Do not add a sign-off.
        - Output only the revised HTML, without code fences or commentary.

        Original summaries:
        {bullet_document}

        Draft newsletter:
        {synthesized}"#}
}

pub async fn synthesize(
    completer: &impl Completer,
    bullet_document: &str,
    params: GenerationParams,
) -> StageResult {
    let completion = completer
        .complete(&synthesis_prompt(bullet_document), params)
        .await;

    let document = match completion.usable_text() {
        Some(text) => StageOutcome::Generated(text.to_string()),
        None => {
            tracing::warn!(
                "Synthesis failed ({}), sending the bullet document as-is",
                completion.text
            );
            StageOutcome::Fallback(bullet_document.to_string())
        }
    };

    StageResult {
        document,
        usage: completion.usage,
    }
}

pub async fn enhance(
    completer: &impl Completer,
    synthesized: &str,
    bullet_document: &str,
    params: GenerationParams,
) -> StageResult {
    let completion = completer
        .complete(&enhancement_prompt(synthesized, bullet_document), params)
        .await;

    let document = match completion.usable_text() {
        Some(text) => StageOutcome::Generated(text.to_string()),
        None => {
            tracing::warn!(
                "Enhancement failed ({}), keeping the synthesized document",
                completion.text
            );
            StageOutcome::Fallback(synthesized.to_string())
        }
    };

    StageResult {
        document,
        usage: completion.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompleter;

    const PARAMS: GenerationParams = GenerationParams {
        max_output_units: 4000,
        temperature: 0.7,
    };

    #[tokio::test]
    async fn test_synthesize_generated() {
        let completer = ScriptedCompleter::new().otherwise("<h1>Digest</h1>");
        let result = synthesize(&completer, "<h2>A</h2>", PARAMS).await;
        assert_eq!(
            result.document,
            StageOutcome::Generated("<h1>Digest</h1>".to_string())
        );
        assert!(result.usage.is_some());
        assert!(completer.prompts()[0].ends_with("Bullet summaries:\n<h2>A</h2>"));
    }

    #[tokio::test]
    async fn test_synthesize_falls_back_to_bullets() {
        let completer = ScriptedCompleter::new().otherwise("[Error: 503]");
        let result = synthesize(&completer, "<h2>A</h2>", PARAMS).await;
        assert!(result.document.is_fallback());
        assert_eq!(result.document.into_inner(), "<h2>A</h2>");
    }

    #[tokio::test]
    async fn test_enhance_falls_back_unchanged() {
        let completer = ScriptedCompleter::new();
        let result = enhance(&completer, "<h1>Draft</h1>", "<ul></ul>", PARAMS).await;
        assert_eq!(
            result.document,
            StageOutcome::Fallback("<h1>Draft</h1>".to_string())
        );
        assert!(result.usage.is_none());
    }

    #[tokio::test]
    async fn test_enhance_sees_both_documents() {
        let completer = ScriptedCompleter::new().otherwise("<h1>Better</h1>");
        let result = enhance(&completer, "<h1>Draft</h1>", "<li>orig</li>", PARAMS).await;
        assert!(!result.document.is_fallback());
        let prompt = &completer.prompts()[0];
        assert!(prompt.contains("<h1>Draft</h1>"));
        assert!(prompt.contains("<li>orig</li>"));
    }
}
