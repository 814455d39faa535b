use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prompt::{Completer, GenerationParams, StageOutcome, UsageRecord};

static RE_CORRECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\*\*(.+?)\*\*:?.*?(?i:the email with the subject)\s*["“]([^"”]+)["”]"#).unwrap()
});

/// One source email as shown to the QA agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSource {
    pub subject: String,
    pub snippet: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub bullet_summary: String,
    pub correct_subject: String,
}

#[derive(Debug)]
pub struct QaResult {
    /// Generated report, or an empty fallback when the agent failed.
    pub report: StageOutcome<String>,
    pub corrections: Vec<Correction>,
    pub usage: Option<UsageRecord>,
}

pub fn qa_prompt(sources: &[LinkSource], html: &str) -> String {
    let source_list = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}. Subject: \"{}\"\n   Snippet: {}\n   Link: {}",
                i + 1,
                s.subject,
                s.snippet,
                s.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {r#"
        You are a quality-assurance agent for a weekly email newsletter.
        Every bullet in the newsletter ends with "Read more here" links that must point to the email the bullet summarizes.

        Source emails (subject, snippet, link):
        {source_list}

        Newsletter HTML:
        {html}

        Tasks:
        1. Check every "here" link against the source list. For each bullet whose link points to the wrong email, write exactly one line in this format:
        **<bolded lead-in of the bullet>**: links to the wrong email; it should link to the email with the subject "<exact subject from the source list>"
        If every link is correct, write "All links verified."
        2. Then give a short critique of the newsletter's overall quality in prose."#}
}

pub fn parse_corrections(report: &str) -> Vec<Correction> {
    report
        .lines()
        .filter_map(|line| RE_CORRECTION.captures(line))
        .filter_map(|caps| {
            let bullet_summary = caps.get(1)?.as_str().trim().trim_end_matches(':').trim();
            let correct_subject = caps.get(2)?.as_str().trim();
            if bullet_summary.is_empty() || correct_subject.is_empty() {
                return None;
            }
            Some(Correction {
                bullet_summary: bullet_summary.to_string(),
                correct_subject: correct_subject.to_string(),
            })
        })
        .collect()
}

pub async fn review_links(
    completer: &impl Completer,
    sources: &[LinkSource],
    html: &str,
    params: GenerationParams,
) -> QaResult {
    let completion = completer.complete(&qa_prompt(sources, html), params).await;

    match completion.usable_text() {
        Some(text) => {
            let corrections = parse_corrections(text);
            tracing::info!("Link QA reported {} correction(s)", corrections.len());
            QaResult {
                report: StageOutcome::Generated(text.to_string()),
                corrections,
                usage: completion.usage,
            }
        }
        None => {
            tracing::warn!("Link QA unavailable: {}", completion.text);
            QaResult {
                report: StageOutcome::Fallback(String::new()),
                corrections: Vec::new(),
                usage: completion.usage,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompleter;

    const PARAMS: GenerationParams = GenerationParams {
        max_output_units: 1500,
        temperature: 0.0,
    };

    #[test]
    fn test_parse_corrections() {
        let report = concat!(
            "Link check:\n",
            "- **AI regulation shift**: links to the wrong email; it should link to the email with the subject \"Policy Weekly\"\n",
            "**Chip supply:** this points elsewhere, the email with the subject “Semis Daily” is correct\n",
            "**Fine bullet**: looks right.\n",
            "Overall the newsletter reads well."
        );

        assert_eq!(
            parse_corrections(report),
            vec![
                Correction {
                    bullet_summary: "AI regulation shift".to_string(),
                    correct_subject: "Policy Weekly".to_string(),
                },
                Correction {
                    bullet_summary: "Chip supply".to_string(),
                    correct_subject: "Semis Daily".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_no_corrections() {
        assert!(parse_corrections("All links verified.\nGreat issue.").is_empty());
        assert!(parse_corrections("").is_empty());
    }

    #[test]
    fn test_prompt_lists_sources_in_order() {
        let sources = vec![
            LinkSource {
                subject: "First".to_string(),
                snippet: "one".to_string(),
                link: "https://l/1".to_string(),
            },
            LinkSource {
                subject: "Second".to_string(),
                snippet: "two".to_string(),
                link: "https://l/2".to_string(),
            },
        ];
        let prompt = qa_prompt(&sources, "<ul></ul>");
        let first = prompt.find("1. Subject: \"First\"").unwrap();
        let second = prompt.find("2. Subject: \"Second\"").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Link: https://l/2"));
    }

    #[tokio::test]
    async fn test_failed_qa_yields_no_corrections() {
        let completer = ScriptedCompleter::new().otherwise("[Error: quota]");
        let result = review_links(&completer, &[], "<ul></ul>", PARAMS).await;
        assert!(result.report.is_fallback());
        assert!(result.corrections.is_empty());
    }
}
