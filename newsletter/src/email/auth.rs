//! Gmail OAuth for a single mailbox.
//!
//! Tokens are cached in a JSON file. An expired access token is refreshed
//! through the token endpoint; when there is no usable token at all the
//! operator goes through the consent screen once, in the terminal.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use url::Url;

use crate::{app_config::GmailConfig, error::AuthError, HttpClient};

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn from_response(resp: GmailApiTokenResponse, previous_refresh: Option<String>) -> Self {
        StoredToken {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(resp.expires_in as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS)
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<StoredToken>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read token file {}", path.display()))?;
        let token = serde_json::from_str(&data)
            .with_context(|| format!("Invalid token file {}", path.display()))?;
        Ok(Some(token))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("Could not write token file {}", path.display()))
    }
}

/// A valid access token, refreshing or re-consenting as needed.
pub async fn load_access_token(
    http_client: &HttpClient,
    gmail_config: &GmailConfig,
    token_path: &Path,
) -> anyhow::Result<String> {
    if let Some(token) = StoredToken::load(token_path)? {
        if !token.is_expired() {
            return Ok(token.access_token);
        }

        if let Some(refresh_token) = token.refresh_token.clone() {
            match exchange_refresh_token(http_client, gmail_config, &refresh_token).await {
                Ok(resp) => {
                    let token = StoredToken::from_response(resp, Some(refresh_token));
                    token.save(token_path)?;
                    tracing::info!("Refreshed Gmail access token");
                    return Ok(token.access_token);
                }
                Err(AuthError::ExpiredOrRevoked) => {
                    tracing::warn!("Refresh token expired or revoked, asking for consent again");
                }
                Err(e) => return Err(e).context("Error refreshing Gmail token"),
            }
        }
    }

    let code = prompt_for_code(gmail_config).await?;
    let resp = exchange_code(http_client, gmail_config, &code)
        .await
        .context("Error exchanging authorization code")?;
    let token = StoredToken::from_response(resp, None);
    token.save(token_path)?;
    tracing::info!("Stored Gmail token at {}", token_path.display());
    Ok(token.access_token)
}

pub fn auth_url(gmail_config: &GmailConfig) -> anyhow::Result<Url> {
    let GmailConfig {
        auth_uri,
        client_id,
        redirect_uris,
        scopes,
        ..
    } = gmail_config;

    let redirect_uri = redirect_uris
        .first()
        .context("client_secret has no redirect_uris")?;
    let mut url = Url::parse(auth_uri).context("Invalid auth_uri")?;
    url.query_pairs_mut().extend_pairs(&[
        ("client_id", client_id.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", scopes.join(" ").as_str()),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ]);
    Ok(url)
}

/// Accepts either the bare code or the whole URL the browser was
/// redirected to.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}

async fn prompt_for_code(gmail_config: &GmailConfig) -> anyhow::Result<String> {
    println!(
        "Open this URL to authorize mailbox access:\n\n{}\n",
        auth_url(gmail_config)?
    );
    println!("Paste the URL you were redirected to (or just the code):");

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Could not read authorization code")?;

    extract_code(&line).context("No authorization code provided")
}

async fn post_token_form(
    http_client: &HttpClient,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<GmailApiTokenResponse, AuthError> {
    let resp = http_client
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Error calling token endpoint: {:?}", e);
            AuthError::BadOauthResponse
        })?;

    let resp = resp.json::<serde_json::Value>().await.map_err(|e| {
        tracing::error!("Unexpected serde error: {:?}", e);
        AuthError::Unexpected(e.to_string())
    })?;

    if resp.get("error").is_some() {
        return match resp.get("error_description").and_then(|d| d.as_str()) {
            Some("Token has been expired or revoked.") => Err(AuthError::ExpiredOrRevoked),
            Some(desc) => {
                tracing::error!("Unexpected error from token endpoint: {:?}", desc);
                Err(AuthError::Unexpected(desc.to_string()))
            }
            None => {
                tracing::error!("Unknown error from token endpoint: {:?}", resp);
                Err(AuthError::Unexpected(resp.to_string()))
            }
        };
    }

    serde_json::from_value::<GmailApiTokenResponse>(resp.clone()).map_err(|_| {
        tracing::error!("Unexpected gmail oauth2 response: {:?}", resp);
        AuthError::BadOauthResponse
    })
}

pub async fn exchange_refresh_token(
    http_client: &HttpClient,
    gmail_config: &GmailConfig,
    refresh_token: &str,
) -> Result<GmailApiTokenResponse, AuthError> {
    post_token_form(
        http_client,
        &gmail_config.token_uri,
        &[
            ("client_id", gmail_config.client_id.as_str()),
            ("client_secret", gmail_config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ],
    )
    .await
}

pub async fn exchange_code(
    http_client: &HttpClient,
    gmail_config: &GmailConfig,
    code: &str,
) -> Result<GmailApiTokenResponse, AuthError> {
    let redirect_uri = gmail_config
        .redirect_uris
        .first()
        .map(String::as_str)
        .unwrap_or_default();
    post_token_form(
        http_client,
        &gmail_config.token_uri,
        &[
            ("client_id", gmail_config.client_id.as_str()),
            ("client_secret", gmail_config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ],
    )
    .await
}
