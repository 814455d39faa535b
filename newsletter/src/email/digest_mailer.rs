use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lettre::message::{Mailbox, MultiPart};
use minijinja::render;

use crate::email::{client::EmailClient, email_template::DIGEST_EMAIL_TEMPLATE};

const PLAIN_TEXT_WIDTH: usize = 80;

/// Sends the finished digest from the mailbox to `recipient`.
pub struct DigestMailer<'a> {
    client: &'a EmailClient,
    sender_name: String,
    sender_address: String,
    recipient: String,
}

impl<'a> DigestMailer<'a> {
    pub fn new(
        client: &'a EmailClient,
        sender_name: &str,
        sender_address: &str,
        recipient: &str,
    ) -> Self {
        Self {
            client,
            sender_name: sender_name.to_string(),
            sender_address: sender_address.to_string(),
            recipient: recipient.to_string(),
        }
    }

    pub fn construct_digest(&self, subject: &str, html: &str) -> anyhow::Result<Vec<u8>> {
        let footer = format!("Sent by {} to {}", self.sender_name, self.recipient);
        let body = html;
        let html = render!(DIGEST_EMAIL_TEMPLATE, subject, body, footer);
        let plain = html2text::from_read(body.as_bytes(), PLAIN_TEXT_WIDTH);

        let from = Mailbox::new(
            Some(self.sender_name.clone()),
            self.sender_address
                .parse()
                .context("Could not parse sender address")?,
        );
        let email = lettre::Message::builder()
            .from(from)
            .to(format!("<{}>", self.recipient)
                .parse()
                .context("Could not parse recipient in digest message builder")?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(plain, html))?;

        Ok(email.formatted())
    }

    pub async fn send(&self, subject: &str, html: &str) -> anyhow::Result<String> {
        tracing::info!("Sending digest {:?} to {}", subject, self.recipient);
        let raw_message = URL_SAFE_NO_PAD.encode(self.construct_digest(subject, html)?);

        let sent = self
            .client
            .send_message(&raw_message)
            .await
            .context("Failed to send digest")?;

        let id = sent.id.unwrap_or_default();
        tracing::info!("Digest sent as message {}", id);
        Ok(id)
    }
}
