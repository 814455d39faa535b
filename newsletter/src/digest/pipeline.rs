use chrono::{DateTime, Datelike, TimeZone};
use chrono_tz::Tz;
use indexmap::IndexMap;

use crate::app_config::Limits;
use crate::digest::corrections::apply_corrections;
use crate::digest::grouping::{group_by_sender, BulletDocument};
use crate::digest::normalize::normalize;
use crate::email::digest_message::DigestMessage;
use crate::prompt::classifier::{classify, Classification};
use crate::prompt::link_qa::{review_links, LinkSource};
use crate::prompt::synthesis::{enhance, synthesize};
use crate::prompt::{Completer, CostLedger, GenerationParams};

pub const FALLBACK_SUBJECT: &str = "Weekly Digest";

const CLASSIFY_TEMPERATURE: f64 = 0.0;
const SUMMARIZE_TEMPERATURE: f64 = 0.3;
const QA_TEMPERATURE: f64 = 0.0;

const EMPTY_DIGEST_HTML: &str =
    "<h1>Weekly Digest</h1>\n<p>No newsletters made the cut this week.</p>";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub limits: Limits,
    /// Used by synthesis and enhancement.
    pub temperature: f64,
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestReport {
    pub subject: String,
    pub html: String,
    pub qualifying: usize,
    pub skipped: usize,
    pub synthesis_fallback: bool,
    pub enhancement_fallback: bool,
    pub corrections_applied: usize,
    /// The QA agent's free-text report, when it produced one.
    pub qa_report: Option<String>,
}

/// Runs classify, summarize, synthesize, enhance, normalize and link QA
/// over a batch of messages, one completion call at a time.
pub struct DigestPipeline<C: Completer> {
    completer: C,
    settings: PipelineSettings,
    ledger: CostLedger,
}

impl<C: Completer> DigestPipeline<C> {
    pub fn new(completer: C, settings: PipelineSettings) -> Self {
        Self {
            completer,
            settings,
            ledger: CostLedger::new(),
        }
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    fn params(&self, max_output_units: u32, temperature: f64) -> GenerationParams {
        GenerationParams {
            max_output_units,
            temperature,
        }
    }

    pub async fn run(&mut self, messages: &[DigestMessage]) -> DigestReport {
        tracing::info!(
            "Running digest over {} message(s) with {}",
            messages.len(),
            self.completer.model_id()
        );

        let qualifying = self.select(messages).await;
        let skipped = messages.len() - qualifying.len();
        let subject = digest_subject(
            qualifying.iter().map(|m| m.internal_date),
            &self.settings.timezone,
        );

        let mut report = DigestReport {
            subject,
            html: EMPTY_DIGEST_HTML.to_string(),
            qualifying: qualifying.len(),
            skipped,
            synthesis_fallback: false,
            enhancement_fallback: false,
            corrections_applied: 0,
            qa_report: None,
        };
        if qualifying.is_empty() {
            tracing::warn!("No qualifying messages, sending an empty digest");
            return report;
        }

        let limits = self.settings.limits.clone();
        let temperature = self.settings.temperature;

        let groups = group_by_sender(&qualifying);
        let summarize_params = self.params(limits.summarize_max_output, SUMMARIZE_TEMPERATURE);
        let document = BulletDocument::build(
            &self.completer,
            &groups,
            limits.summarize_body_chars,
            summarize_params,
            &mut self.ledger,
        )
        .await;
        if document.is_empty() {
            tracing::warn!("Every summary failed, sending an empty digest");
            return report;
        }
        let bullet_html = document.render();

        let synthesized = synthesize(
            &self.completer,
            &bullet_html,
            self.params(limits.synthesize_max_output, temperature),
        )
        .await;
        self.ledger.record("synthesize", synthesized.usage.as_ref());
        report.synthesis_fallback = synthesized.document.is_fallback();
        let synthesized = synthesized.document.into_inner();

        let enhanced = enhance(
            &self.completer,
            &synthesized,
            &bullet_html,
            self.params(limits.enhance_max_output, temperature),
        )
        .await;
        self.ledger.record("enhance", enhanced.usage.as_ref());
        report.enhancement_fallback = enhanced.document.is_fallback();

        let normalized = normalize(enhanced.document.value(), &document.link_lists());

        let sources: Vec<LinkSource> = groups
            .values()
            .flatten()
            .map(|m| LinkSource {
                subject: m.subject.clone(),
                snippet: m.snippet_prefix(limits.qa_snippet_chars).to_string(),
                link: m.deep_link(),
            })
            .collect();
        let qa = review_links(
            &self.completer,
            &sources,
            &normalized,
            self.params(limits.qa_max_output, QA_TEMPERATURE),
        )
        .await;
        self.ledger.record("link_qa", qa.usage.as_ref());

        let mut subject_links: IndexMap<String, String> = IndexMap::new();
        for source in sources {
            subject_links.entry(source.subject).or_insert(source.link);
        }
        let (html, corrections_applied) =
            apply_corrections(&normalized, &qa.corrections, &subject_links);

        report.html = html;
        report.corrections_applied = corrections_applied;
        if !qa.report.is_fallback() {
            report.qa_report = Some(qa.report.into_inner());
        }
        report
    }

    /// Messages the classifier wants in the digest, in input order.
    async fn select(&mut self, messages: &[DigestMessage]) -> Vec<DigestMessage> {
        let params = self.params(self.settings.limits.classify_max_output, CLASSIFY_TEMPERATURE);
        let mut qualifying = Vec::new();

        for message in messages {
            let outcome = classify(
                &self.completer,
                &message.subject,
                &message.from,
                &message.body,
                self.settings.limits.classify_body_chars,
                params,
            )
            .await;
            self.ledger.record("classify", outcome.usage.as_ref());

            let Classification { include, reason } = outcome.classification;
            if include {
                tracing::info!("Including {} ({}): {}", message.id, message.subject, reason);
                qualifying.push(message.clone());
            } else {
                tracing::info!("Skipping {} ({}): {}", message.id, message.subject, reason);
            }
        }

        tracing::info!("{}/{} message(s) qualify", qualifying.len(), messages.len());
        qualifying
    }
}

/// Subject line spanning the earliest and latest message dates, e.g.
/// `Weekly Digest: October 6–12, 2025` or `Weekly Digest: Sep 29 – Oct 5, 2025`.
pub fn digest_subject(timestamps: impl IntoIterator<Item = i64>, tz: &Tz) -> String {
    let dates: Vec<DateTime<Tz>> = timestamps
        .into_iter()
        .filter_map(|ms| tz.timestamp_millis_opt(ms).single())
        .collect();
    let (Some(start), Some(end)) = (dates.iter().min(), dates.iter().max()) else {
        return FALLBACK_SUBJECT.to_string();
    };

    let range = if start.date_naive() == end.date_naive() {
        format!("{} {}, {}", start.format("%B"), start.day(), start.year())
    } else if (start.year(), start.month()) == (end.year(), end.month()) {
        format!(
            "{} {}–{}, {}",
            start.format("%B"),
            start.day(),
            end.day(),
            end.year()
        )
    } else if start.year() == end.year() {
        format!(
            "{} {} – {} {}, {}",
            start.format("%b"),
            start.day(),
            end.format("%b"),
            end.day(),
            end.year()
        )
    } else {
        format!(
            "{} {}, {} – {} {}, {}",
            start.format("%b"),
            start.day(),
            start.year(),
            end.format("%b"),
            end.day(),
            end.year()
        )
    };
    format!("{FALLBACK_SUBJECT}: {range}")
}
