use std::cell::RefCell;

use chrono::{TimeZone, Utc};
use google_gmail1::api::Message;
use lettre::message::{header::ContentType, Mailbox};

use crate::{
    email::digest_message::DigestMessage,
    prompt::{
        gateway::{Completer, Completion, GenerationParams, NO_RESPONSE},
        gemini::approx_units,
        UsageRecord,
    },
};

pub const SCRIPTED_MODEL: &str = "gpt-4o-mini";

/// In-memory completer that answers by matching prompt substrings,
/// first matching rule wins.
pub struct ScriptedCompleter {
    rules: Vec<(String, String)>,
    default_reply: String,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedCompleter {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: NO_RESPONSE.to_string(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn otherwise(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Completer for ScriptedCompleter {
    fn model_id(&self) -> &str {
        SCRIPTED_MODEL
    }

    async fn complete(&self, prompt: &str, _params: GenerationParams) -> Completion {
        self.prompts.borrow_mut().push(prompt.to_string());
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());

        let mut completion = Completion {
            usage: Some(UsageRecord {
                input_units: approx_units(prompt),
                output_units: approx_units(&reply),
                model: SCRIPTED_MODEL.to_string(),
            }),
            text: reply,
        };
        if completion.is_sentinel() {
            completion.usage = None;
        }
        completion
    }
}

/// Milliseconds since epoch for a UTC calendar date at noon.
pub fn utc_millis(year: i32, month: u32, day: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_default()
}

pub fn digest_message(
    id: &str,
    from: &str,
    subject: &str,
    body: &str,
    internal_date: i64,
) -> DigestMessage {
    DigestMessage::new(
        id.to_string(),
        from.to_string(),
        subject.to_string(),
        body.to_string(),
        internal_date,
    )
}

/// Gmail API message in RAW format, as `messages.get?format=RAW` returns it.
pub fn raw_gmail_message(id: &str, from: &str, subject: &str, html_body: &str) -> Message {
    let from: Mailbox = from.parse().expect("valid from address");
    let email = lettre::Message::builder()
        .from(from)
        .to("Me <me@example.com>".parse().expect("valid to address"))
        .subject(subject)
        .message_id(Some(format!("<{id}@mail.example.com>")))
        .header(ContentType::TEXT_HTML)
        .body(html_body.to_string())
        .expect("valid test message");

    Message {
        id: Some(id.to_string()),
        thread_id: Some(format!("thread-{id}")),
        snippet: Some(format!("Snippet for {subject}")),
        internal_date: Some(utc_millis(2025, 10, 6)),
        raw: Some(email.formatted()),
        ..Default::default()
    }
}
