use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, result::Result};

use crate::prompt::gateway::{GatewayConfig, ModelId};

#[derive(Debug, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
}

impl GmailConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        builder.try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub lookback_days: i64,
    pub labels: Vec<String>,
    pub max_results_per_label: u32,
    pub timezone: String,
    pub recipient: Option<String>,
    pub sender_name: String,
    pub dry_run_output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    pub classify_body_chars: usize,
    pub summarize_body_chars: usize,
    pub qa_snippet_chars: usize,
    pub classify_max_output: u32,
    pub summarize_max_output: u32,
    pub synthesize_max_output: u32,
    pub enhance_max_output: u32,
    pub qa_max_output: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            classify_body_chars: 2000,
            summarize_body_chars: 4000,
            qa_snippet_chars: 200,
            classify_max_output: 200,
            summarize_max_output: 400,
            synthesize_max_output: 4000,
            enhance_max_output: 5000,
            qa_max_output: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    pub openai_base_url: String,
    pub gemini_base_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    model: ModelConfig,
    #[serde(default)]
    limits: Limits,
    endpoints: Endpoints,
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub settings: Settings,
    pub model: ModelConfig,
    pub limits: Limits,
    pub endpoints: Endpoints,
    pub gmail_config: GmailConfig,
}

impl AppConfig {
    /// `DIGEST_MODEL` takes precedence over `model.id`.
    pub fn model_id(&self) -> anyhow::Result<ModelId> {
        let id = env::var("DIGEST_MODEL").unwrap_or_else(|_| self.model.id.clone());
        id.parse::<ModelId>()
            .map_err(|_| anyhow::anyhow!("Unknown model id {:?}", id))
    }

    pub fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        Ok(GatewayConfig {
            model: self.model_id()?,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .or_else(|_| env::var("GOOGLE_API_KEY"))
                .ok(),
            openai_base_url: self.endpoints.openai_base_url.clone(),
            gemini_base_url: self.endpoints.gemini_base_url.clone(),
        })
    }

    pub fn timezone(&self) -> anyhow::Result<chrono_tz::Tz> {
        self.settings
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {:?}: {}", self.settings.timezone, e))
    }

    pub fn token_path(&self) -> PathBuf {
        env::var("TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.root.join("token.json"))
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Newsletter Config:\n{:?}\n\nModel: {:?}\n\nLimits: {:?}\n\nEndpoints: {:?}\n\nGmail client: {}",
            self.settings, self.model, self.limits, self.endpoints, self.gmail_config.client_id,
        )
    }
}

pub fn is_dry_run() -> bool {
    env::var("DRY_RUN").is_ok_and(|v| v == "true")
}

pub fn is_list_only() -> bool {
    env::var("LIST_ONLY").is_ok_and(|v| v == "true")
}

fn config_root() -> PathBuf {
    env::var("APP_DIR").map(PathBuf::from).unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .join("config")
    })
}

lazy_static! {
    pub static ref cfg: AppConfig = {
        let root = config_root();
        let path = root.join("client_secret.toml").display().to_string();
        let gmail_config = GmailConfig::from_file(&path).expect("client_secret.toml is required");
        let path = root.join("config.toml").display().to_string();
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        let ConfigFile {
            settings,
            model,
            limits,
            endpoints,
        } = cfg_file;

        AppConfig {
            root,
            settings,
            model,
            limits,
            endpoints,
            gmail_config,
        }
    };
}
