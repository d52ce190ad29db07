//! Herald email delivery worker.
//!
//! Consumes delivery jobs from the email topic and drives SMTP delivery,
//! posting status callbacks to the orchestrator. Runs until CTRL+C or
//! SIGTERM, then drains in-flight messages.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use herald_api::{logging, Config};
use herald_delivery::{
    EmailProcessor, EmailWorker, HttpStatusReporter, ProcessorConfig, SmtpConfig, SmtpSender,
};
use herald_queue::QueueConsumer;
use herald_resilience::RetryConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Timeout for status callback posts.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logging::init(&config.log_level, &config.log_format);

    info!(
        topic = %config.email_topic,
        group = %config.group_id,
        smtp_host = %config.smtp_host,
        "starting herald email worker"
    );

    let consumer = Arc::new(
        QueueConsumer::connect(config.consumer_config())
            .await
            .context("failed to connect consumer")?,
    );

    let sender = Arc::new(SmtpSender::new(SmtpConfig {
        host: config.smtp_host.clone(),
        port: config.smtp_port,
        username: config.smtp_user.clone(),
        password: config.smtp_pass.clone(),
        from: config.email_from.clone(),
    })?);

    let reporter = Arc::new(HttpStatusReporter::new(
        config.orchestrator_url.clone(),
        CALLBACK_TIMEOUT,
    )?);

    let processor = Arc::new(EmailProcessor::new(sender, reporter, ProcessorConfig {
        retry: RetryConfig::smtp(),
        budget: config.smtp_retry_budget,
        fallback_recipient: config.email_fallback_recipient.clone(),
    }));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_listener(cancel.clone()));

    let worker = EmailWorker::new(consumer, processor, cancel);
    worker.run().await?;

    info!("email worker shutdown complete");
    Ok(())
}

/// Cancels the worker on CTRL+C or SIGTERM.
async fn shutdown_listener(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }

    cancel.cancel();
}
