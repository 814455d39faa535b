use indexmap::IndexSet;

use crate::email::client::{header_value, EmailClient, MessageListOptions};
use crate::email::digest_message::{DigestMessage, NO_SENDER, NO_SUBJECT};

/// Message ids from every label, first-seen order, without duplicates.
/// Stops paging a label once `max_per_label` ids were collected for it.
pub async fn list_recent_ids(
    client: &EmailClient,
    labels: &[String],
    days: i64,
    max_per_label: u32,
) -> anyhow::Result<IndexSet<String>> {
    let mut ids = IndexSet::new();

    for label in labels {
        let mut page_token = None;
        let mut collected = 0u32;
        loop {
            let resp = client
                .get_message_list(MessageListOptions {
                    label: Some(label.clone()),
                    newer_than_days: Some(days),
                    page_token,
                    max_results: Some(max_per_label - collected),
                })
                .await?;

            let page = resp.messages.unwrap_or_default();
            collected += page.len() as u32;
            ids.extend(page.into_iter().filter_map(|m| m.id));

            page_token = resp.next_page_token;
            if page_token.is_none() || collected >= max_per_label {
                break;
            }
        }
        tracing::info!("Label {}: {} message(s) in the last {} day(s)", label, collected, days);
    }

    Ok(ids)
}

/// Fetches and extracts every recent message. A message that cannot be
/// fetched or parsed is skipped.
pub async fn fetch_recent(
    client: &EmailClient,
    labels: &[String],
    days: i64,
    max_per_label: u32,
) -> anyhow::Result<Vec<DigestMessage>> {
    let ids = list_recent_ids(client, labels, days, max_per_label).await?;
    let mut messages = Vec::with_capacity(ids.len());

    for id in &ids {
        let message = match client.get_message_by_id(id).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Skipping message {}: {:?}", id, e);
                continue;
            }
        };
        match DigestMessage::from_gmail_message(message) {
            Ok(message) => messages.push(message),
            Err(e) => tracing::warn!("Could not parse message {}: {:?}", id, e),
        }
    }

    tracing::info!("Fetched {}/{} message(s)", messages.len(), ids.len());
    Ok(messages)
}

/// Logs subject and sender of every recent message without running the
/// pipeline. Returns the number of distinct messages.
pub async fn count_recent(
    client: &EmailClient,
    labels: &[String],
    days: i64,
    max_per_label: u32,
) -> anyhow::Result<usize> {
    let ids = list_recent_ids(client, labels, days, max_per_label).await?;

    for id in &ids {
        match client.get_message_metadata(id).await {
            Ok(message) => tracing::info!(
                "{} | {} | {}",
                id,
                header_value(&message, "From").unwrap_or(NO_SENDER),
                header_value(&message, "Subject").unwrap_or(NO_SUBJECT)
            ),
            Err(e) => tracing::warn!("Could not read metadata for {}: {:?}", id, e),
        }
    }

    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::raw_gmail_message;
    use crate::HttpClient;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_list(server: &MockServer, label: &str, ids: &[&str]) {
        let messages: Vec<_> = ids.iter().map(|id| json!({ "id": id, "threadId": id })).collect();
        Mock::given(method("GET"))
            .and(path("/messages"))
            .and(query_param("q", format!("after:{} label:{}", cutoff(), label)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": messages })))
            .mount(server)
            .await;
    }

    fn cutoff() -> String {
        (chrono::Utc::now() - chrono::Duration::days(7))
            .format("%Y/%m/%d")
            .to_string()
    }

    async fn mock_raw(server: &MockServer, id: &str, subject: &str) {
        let message = raw_gmail_message(id, "Sender <s@x.com>", subject, "<p>Body text</p>");
        Mock::given(method("GET"))
            .and(path(format!("/messages/{id}")))
            .and(query_param("format", "RAW"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::to_value(&message).unwrap()),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_recent_dedupes_and_skips_failures() {
        let server = MockServer::start().await;
        mock_list(&server, "promotions", &["a", "b"]).await;
        mock_list(&server, "updates", &["b", "c"]).await;
        mock_raw(&server, "a", "First").await;
        mock_raw(&server, "b", "Second").await;
        Mock::given(method("GET"))
            .and(path("/messages/c"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "Requested entity was not found." }
            })))
            .mount(&server)
            .await;

        let client = EmailClient::new(HttpClient::new(), "token".to_string())

            .with_api_base(server.uri());
        let labels = vec!["promotions".to_string(), "updates".to_string()];

        let messages = fetch_recent(&client, &labels, 7, 50).await.unwrap();

        let subjects: Vec<_> = messages.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["First", "Second"]);
        assert!(messages[0].body.contains("Body text"));
    }

    #[tokio::test]
    async fn test_count_recent() {
        let server = MockServer::start().await;
        mock_list(&server, "updates", &["x", "y"]).await;
        Mock::given(method("GET"))
            .and(path("/messages/x"))
            .and(query_param("format", "METADATA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "x",
                "payload": { "headers": [{ "name": "Subject", "value": "Hi" }] }
            })))
            .mount(&server)
            .await;

        let client = EmailClient::new(HttpClient::new(), "token".to_string())

            .with_api_base(server.uri());
        let count = count_recent(&client, &["updates".to_string()], 7, 10).await.unwrap();
        assert_eq!(count, 2);
    }
}
