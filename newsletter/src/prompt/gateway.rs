use std::fmt;

use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    prompt::{cost::UsageRecord, gemini, openai},
    HttpClient,
};

pub const NO_RESPONSE: &str = "[No response]";
const ERROR_PREFIX: &str = "[Error:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
pub enum ModelId {
    #[strum(serialize = "gpt-4o-mini")]
    Gpt4oMini,
    #[strum(serialize = "gpt-4o")]
    Gpt4o,
    #[strum(serialize = "gemini-1.5-flash")]
    Gemini15Flash,
    #[strum(serialize = "gemini-1.5-pro")]
    Gemini15Pro,
    #[strum(serialize = "gemini-2.0-flash")]
    Gemini20Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    /// OpenAI-style chat completions; usage is reported as tokens.
    ChatCompletions,
    /// Gemini `generateContent`; usage is derived from character counts.
    Gemini,
}

impl ModelId {
    pub fn family(&self) -> BackendFamily {
        match self {
            ModelId::Gpt4oMini | ModelId::Gpt4o => BackendFamily::ChatCompletions,
            ModelId::Gemini15Flash | ModelId::Gemini15Pro | ModelId::Gemini20Flash => {
                BackendFamily::Gemini
            }
        }
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub model: ModelId,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_base_url: String,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("model", &self.model)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("openai_base_url", &self.openai_base_url)
            .field("gemini_base_url", &self.gemini_base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_output_units: u32,
    pub temperature: f64,
}

/// Text returned by a backend before the gateway applies sentinels.
#[derive(Debug)]
pub struct BackendReply {
    pub text: String,
    pub usage: UsageRecord,
}

/// Result of one completion call. Failures are carried as sentinel text
/// (`[Error: ...]`, `[No response]`) with no usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageRecord>,
}

impl Completion {
    pub fn error(description: impl fmt::Display) -> Self {
        Self {
            text: format!("{ERROR_PREFIX} {description}]"),
            usage: None,
        }
    }

    pub fn no_response() -> Self {
        Self {
            text: NO_RESPONSE.to_string(),
            usage: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        let text = self.text.trim();
        text == NO_RESPONSE || (text.starts_with(ERROR_PREFIX) && text.ends_with(']'))
    }

    pub fn usable_text(&self) -> Option<&str> {
        if self.is_sentinel() {
            None
        } else {
            Some(self.text.trim())
        }
    }
}

/// A text-generation backend. The pipeline only ever talks to this trait.
#[allow(async_fn_in_trait)]
pub trait Completer {
    fn model_id(&self) -> &str;

    async fn complete(&self, prompt: &str, params: GenerationParams) -> Completion;
}

pub struct CompletionGateway {
    http_client: HttpClient,
    config: GatewayConfig,
}

impl CompletionGateway {
    pub fn new(http_client: HttpClient, config: GatewayConfig) -> Self {
        tracing::info!("Completion gateway using model {}", config.model);
        Self {
            http_client,
            config,
        }
    }
}

impl Completer for CompletionGateway {
    fn model_id(&self) -> &str {
        self.config.model.as_ref()
    }

    async fn complete(&self, prompt: &str, params: GenerationParams) -> Completion {
        let result = match self.config.model.family() {
            BackendFamily::ChatCompletions => {
                openai::complete(&self.http_client, &self.config, prompt, params).await
            }
            BackendFamily::Gemini => {
                gemini::complete(&self.http_client, &self.config, prompt, params).await
            }
        };

        match result {
            Ok(reply) if reply.text.trim().is_empty() => {
                tracing::warn!("Model {} returned no text", self.config.model);
                Completion::no_response()
            }
            Ok(BackendReply { text, usage }) => {
                tracing::debug!(
                    "Model {} used {} input / {} output units",
                    usage.model,
                    usage.input_units,
                    usage.output_units
                );
                Completion {
                    text,
                    usage: Some(usage),
                }
            }
            Err(e) => {
                tracing::error!("Completion with {} failed: {}", self.config.model, e);
                Completion::error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::prompt::cost::{pricing_for, PRICING};

    fn config(model: ModelId, base_url: &str) -> GatewayConfig {
        GatewayConfig {
            model,
            openai_api_key: Some("test-key".to_string()),
            gemini_api_key: Some("test-key".to_string()),
            openai_base_url: base_url.to_string(),
            gemini_base_url: base_url.to_string(),
        }
    }

    const PARAMS: GenerationParams = GenerationParams {
        max_output_units: 100,
        temperature: 0.2,
    };

    #[test]
    fn test_every_model_has_a_price() {
        for model in ModelId::iter() {
            assert!(
                PRICING.iter().any(|(id, _)| *id == model.as_ref()),
                "{model} is missing from the pricing table"
            );
            let _ = pricing_for(model.as_ref());
        }
    }

    #[test]
    fn test_model_id_parse() {
        assert_eq!("gpt-4o-mini".parse::<ModelId>().unwrap(), ModelId::Gpt4oMini);
        assert_eq!(
            "gemini-1.5-flash".parse::<ModelId>().unwrap(),
            ModelId::Gemini15Flash
        );
        assert!("claude".parse::<ModelId>().is_err());
        assert_eq!(ModelId::Gpt4o.family(), BackendFamily::ChatCompletions);
        assert_eq!(ModelId::Gemini15Pro.family(), BackendFamily::Gemini);
    }

    #[test]
    fn test_sentinels() {
        let err = Completion::error("connection refused");
        assert_eq!(err.text, "[Error: connection refused]");
        assert!(err.is_sentinel());
        assert_eq!(err.usable_text(), None);

        assert!(Completion::no_response().is_sentinel());

        let ok = Completion {
            text: "  Include: yes \n".to_string(),
            usage: None,
        };
        assert!(!ok.is_sentinel());
        assert_eq!(ok.usable_text(), Some("Include: yes"));
    }

    #[tokio::test]
    async fn test_backend_error_becomes_sentinel() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let gateway = CompletionGateway::new(
            HttpClient::new(),
            config(ModelId::Gpt4oMini, &mock_server.uri()),
        );
        let completion = gateway.complete("hello", PARAMS).await;

        assert!(completion.text.starts_with("[Error:"));
        assert!(completion.is_sentinel());
        assert_eq!(completion.usage, None);
    }

    #[tokio::test]
    async fn test_missing_key_becomes_sentinel() {
        let mut config = config(ModelId::Gemini15Flash, "http://127.0.0.1:9");
        config.gemini_api_key = None;
        let gateway = CompletionGateway::new(HttpClient::new(), config);

        let completion = gateway.complete("hello", PARAMS).await;

        assert!(completion.is_sentinel());
        assert!(completion.text.contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_empty_text_is_no_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 5, "completion_tokens": 0, "total_tokens": 5 }
            })))
            .mount(&mock_server)
            .await;

        let gateway = CompletionGateway::new(
            HttpClient::new(),
            config(ModelId::Gpt4o, &mock_server.uri()),
        );
        let completion = gateway.complete("hello", PARAMS).await;

        assert_eq!(completion, Completion::no_response());
    }
}
