use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

use crate::error::{from_status, AppError, AppResult};
use crate::prompt::{
    cost::{UsageRecord, CHARS_PER_UNIT},
    gateway::{BackendReply, GatewayConfig, GenerationParams},
};
use crate::HttpClient;

/// Gemini usage is approximated from character counts so that it prices
/// against the per-character rates.
pub fn approx_units(text: &str) -> u64 {
    text.chars().count() as u64 / CHARS_PER_UNIT
}

pub async fn complete(
    http_client: &HttpClient,
    config: &GatewayConfig,
    prompt: &str,
    params: GenerationParams,
) -> AppResult<BackendReply> {
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or(AppError::MissingApiKey("GEMINI_API_KEY"))?;
    let endpoint = format!(
        "{}/models/{}:generateContent",
        config.gemini_base_url.trim_end_matches('/'),
        config.model
    );

    let resp = http_client
        .post(endpoint)
        .query(&[("key", api_key)])
        .json(&json!(
          {
            "contents": [
              {
                "role": "user",
                "parts": [{ "text": prompt }]
              }
            ],
            "generationConfig": {
              "maxOutputTokens": params.max_output_units,
              "temperature": params.temperature
            }
          }
        ))
        .send()
        .await?;

    let status = resp.status();
    let body = resp.json::<serde_json::Value>().await?;

    if !status.is_success() {
        let message = serde_json::from_value::<GeminiErrorBody>(body.clone())
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());
        return Err(from_status(status, message));
    }

    let parsed = serde_json::from_value::<GenerateContentResponse>(body.clone())
        .context(format!("Could not parse generateContent response: {}", body))?;

    if let Some(reason) = parsed
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(AppError::BadRequest(format!("prompt blocked: {reason}")));
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or(AppError::EmptyResponse)?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        tracing::warn!("Gemini output was cut off at {} tokens", params.max_output_units);
    }

    Ok(BackendReply {
        usage: UsageRecord {
            input_units: approx_units(prompt),
            output_units: approx_units(&text),
            model: config.model.to_string(),
        },
        text,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
