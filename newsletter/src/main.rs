#![allow(dead_code)]
mod app_config;
mod digest;
mod email;
mod error;
mod prompt;
#[cfg(test)]
mod testing;
mod util;

use anyhow::Context;
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    app_config::{cfg, is_dry_run, is_list_only},
    digest::{DigestPipeline, PipelineSettings},
    email::{
        auth::load_access_token,
        client::EmailClient,
        digest_mailer::DigestMailer,
        fetch::{count_recent, fetch_recent},
    },
    prompt::CompletionGateway,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    tracing::debug!("{}", *cfg);

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let settings = &cfg.settings;

    let access_token = load_access_token(&http_client, &cfg.gmail_config, &cfg.token_path())
        .await
        .context("Could not obtain a Gmail access token")?;
    let email_client = EmailClient::new(http_client.clone(), access_token);

    if is_list_only() {
        let count = count_recent(
            &email_client,
            &settings.labels,
            settings.lookback_days,
            settings.max_results_per_label,
        )
        .await?;
        println!("{} message(s) in the last {} day(s)", count, settings.lookback_days);
        return Ok(());
    }

    let messages = fetch_recent(
        &email_client,
        &settings.labels,
        settings.lookback_days,
        settings.max_results_per_label,
    )
    .await?;

    let gateway = CompletionGateway::new(http_client, cfg.gateway_config()?);
    let mut pipeline = DigestPipeline::new(
        gateway,
        PipelineSettings {
            limits: cfg.limits.clone(),
            temperature: cfg.model.temperature,
            timezone: cfg.timezone()?,
        },
    );
    let report = pipeline.run(&messages).await;
    tracing::info!(
        "Digest ready: {} qualifying, {} skipped, {} correction(s), synthesis fallback: {}, enhancement fallback: {}",
        report.qualifying,
        report.skipped,
        report.corrections_applied,
        report.synthesis_fallback,
        report.enhancement_fallback
    );
    if let Some(qa_report) = &report.qa_report {
        tracing::info!("Link QA report:\n{}", qa_report);
    }

    let sent = if is_dry_run() {
        write_dry_run(&report.subject, &report.html, settings.dry_run_output.as_deref())
    } else {
        send_digest(&email_client, &report.subject, &report.html).await
    };

    println!("{}", pipeline.ledger());
    sent
}

fn write_dry_run(subject: &str, html: &str, output: Option<&str>) -> anyhow::Result<()> {
    println!("Dry run, not sending {:?}", subject);
    match output {
        Some(path) => {
            std::fs::write(path, html)
                .with_context(|| format!("Could not write digest to {}", path))?;
            println!("Digest written to {}", path);
        }
        None => println!("{}", html),
    }
    Ok(())
}

async fn send_digest(email_client: &EmailClient, subject: &str, html: &str) -> anyhow::Result<()> {
    let settings = &cfg.settings;
    let profile = email_client.get_profile().await?;
    let own_address = profile
        .email_address
        .context("Gmail profile has no email address")?;
    let recipient = settings.recipient.as_deref().unwrap_or(&own_address);

    DigestMailer::new(email_client, &settings.sender_name, &own_address, recipient)
        .send(subject, html)
        .await?;
    Ok(())
}
