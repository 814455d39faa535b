use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{from_status, AppError, AppResult};
use crate::prompt::{
    cost::UsageRecord,
    gateway::{BackendReply, GatewayConfig, GenerationParams},
};
use crate::HttpClient;

pub async fn complete(
    http_client: &HttpClient,
    config: &GatewayConfig,
    prompt: &str,
    params: GenerationParams,
) -> AppResult<BackendReply> {
    let api_key = config
        .openai_api_key
        .as_deref()
        .ok_or(AppError::MissingApiKey("OPENAI_API_KEY"))?;
    let endpoint = format!(
        "{}/chat/completions",
        config.openai_base_url.trim_end_matches('/')
    );

    let resp = http_client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&json!(
          {
            "model": config.model.as_ref(),
            "temperature": params.temperature,
            "max_tokens": params.max_output_units,
            "messages": [
              {
                "role": "user",
                "content": prompt
              }
            ]
          }
        ))
        .send()
        .await?;

    let status = resp.status();
    let body = resp.json::<serde_json::Value>().await?;

    let parsed = serde_json::from_value::<ChatApiResponseOrError>(body.clone())
        .context(format!("Could not parse chat response: {}", body))?;

    let parsed = match parsed {
        ChatApiResponseOrError::Error(ChatApiErrorBody { error }) => {
            return Err(from_status(status, error.message));
        }
        ChatApiResponseOrError::Response(parsed) if status.is_success() => parsed,
        ChatApiResponseOrError::Response(_) => {
            return Err(from_status(status, body.to_string()));
        }
    };

    let choice = parsed.choices.into_iter().next().ok_or(AppError::EmptyResponse)?;
    if matches!(choice.finish_reason, Some(FinishReason::Length)) {
        tracing::warn!("Chat completion was cut off at {} tokens", params.max_output_units);
    }

    Ok(BackendReply {
        text: choice.message.content.unwrap_or_default(),
        usage: UsageRecord {
            input_units: parsed.usage.prompt_tokens,
            output_units: parsed.usage.completion_tokens,
            model: config.model.to_string(),
        },
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: PromptUsage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiErrorBody {
    pub error: ChatApiError,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiErrorBody),
}
