use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use google_gmail1::api::{ListMessagesResponse, Message, Profile};
use leaky_bucket::RateLimiter;
use lib_email_clients::gmail::api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND};
use serde_json::json;

use crate::HttpClient;

pub const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
pub const MAX_MESSAGES_PER_PAGE_DEFAULT: u32 = 500;

macro_rules! gmail_url {
    ($base:expr, $($params:expr),*) => {
        {
            let list_params: Vec<&str> = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", $base, path)
        }
    };
}

/// Gmail API error response structure
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiError {
    pub error: GmailApiErrorDetail,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Clone)]
/// Filter and paging options for message list
pub struct MessageListOptions {
    /// Gmail category or label name, e.g. `promotions`
    pub label: Option<String>,
    /// Only messages received in the last N days
    pub newer_than_days: Option<i64>,
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
}

impl MessageListOptions {
    /// Gmail search query, e.g. `after:2025/10/06 label:promotions`.
    pub fn query(&self, now: DateTime<Utc>) -> String {
        let mut filters = vec![];
        if let Some(days) = self.newer_than_days {
            let cutoff = now - chrono::Duration::days(days);
            filters.push(format!("after:{}", cutoff.format("%Y/%m/%d")));
        }
        if let Some(label) = &self.label {
            filters.push(format!("label:{}", label));
        }
        filters.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct EmailClient {
    http_client: HttpClient,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
    api_base: String,
}

impl EmailClient {
    pub fn new(http_client: HttpClient, access_token: String) -> EmailClient {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        EmailClient {
            http_client,
            access_token,
            rate_limiter,
            api_base: GMAIL_ENDPOINT.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub async fn get_message_list(
        &self,
        options: MessageListOptions,
    ) -> anyhow::Result<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let max_results = options.max_results.unwrap_or(MAX_MESSAGES_PER_PAGE_DEFAULT);
        let mut query = vec![
            ("q".to_string(), options.query(Utc::now())),
            ("maxResults".to_string(), max_results.to_string()),
        ];
        if let Some(token) = options.page_token {
            query.push(("pageToken".to_string(), token));
        }

        let resp = self
            .http_client
            .get(gmail_url!(self.api_base, "messages"))
            .query(&query)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        parse_response(resp).await.context("Error listing messages")
    }

    pub async fn get_message_by_id(&self, message_id: &str) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;
        let resp = self
            .http_client
            .get(gmail_url!(self.api_base, "messages", message_id))
            .bearer_auth(&self.access_token)
            .query(&[("format", "RAW")])
            .send()
            .await?;

        parse_response(resp)
            .await
            .with_context(|| format!("Error getting message {}", message_id))
    }

    /// Headers only, with `Subject` and `From` in the payload.
    pub async fn get_message_metadata(&self, message_id: &str) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;
        let resp = self
            .http_client
            .get(gmail_url!(self.api_base, "messages", message_id))
            .bearer_auth(&self.access_token)
            .query(&[
                ("format", "METADATA"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
            ])
            .send()
            .await?;

        parse_response(resp)
            .await
            .with_context(|| format!("Error getting metadata for {}", message_id))
    }

    pub async fn get_profile(&self) -> anyhow::Result<Profile> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.get_profile).await;
        let resp = self
            .http_client
            .get(gmail_url!(self.api_base, "profile"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        parse_response(resp).await.context("Error getting profile")
    }

    /// Send an email using the Gmail API
    /// The raw_message should be a base64url-encoded RFC 2822 MIME message
    pub async fn send_message(&self, raw_message: &str) -> anyhow::Result<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_send)
            .await;

        let resp = self
            .http_client
            .post(gmail_url!(self.api_base, "messages", "send"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "raw": raw_message }))
            .send()
            .await?;

        parse_response(resp).await.context("Error sending message")
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> anyhow::Result<T> {
    let status = resp.status();
    let data = resp.json::<serde_json::Value>().await?;

    if !status.is_success() || data.get("error").is_some() {
        return match serde_json::from_value::<GmailApiError>(data.clone()) {
            Ok(GmailApiError { error }) => Err(anyhow!(
                "Gmail API error {} ({}): {}",
                error.code,
                error.status.unwrap_or_default(),
                error.message
            )),
            Err(_) => Err(anyhow!("Gmail API error {}: {:?}", status, data)),
        };
    }

    Ok(serde_json::from_value(data)?)
}

/// `header` value from a METADATA-format message.
pub fn header_value<'a>(message: &'a Message, header: &str) -> Option<&'a str> {
    message
        .payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(header)))
        .and_then(|h| h.value.as_deref())
}
