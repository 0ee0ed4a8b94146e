mod config;
mod mail;

use config::AppConfig;
use mail::{factory, FetchOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Mailfetch starting...");
    tracing::info!(
        "Mailbox: {} via {}:{}",
        config.mailbox.protocol,
        config.mailbox.host,
        config.mailbox.port
    );
    tracing::info!("Spool: {}", config.ingest.spool_dir.display());

    tokio::fs::create_dir_all(&config.ingest.spool_dir).await?;

    // An unsupported protocol identifier is a configuration error;
    // bail out instead of running with a mailbox we cannot reach.
    let mut session = factory::create_session(&config.mailbox.protocol, config.ingest.debug_mode)?;
    if config.mailbox.starttls {
        session.enable_starttls();
    }
    if config.mailbox.validate_cert {
        session.require_valid_certificate();
    }

    if !session
        .connect(
            &config.mailbox.host,
            config.mailbox.port,
            &config.mailbox.login,
            &config.mailbox.password,
        )
        .await
    {
        anyhow::bail!("could not connect to mailbox: {}", session.error());
    }

    let total = session.number_of_messages().await;
    tracing::info!("{total} message(s) to inspect");

    let mut fetched = 0u32;
    let mut deleted = 0u32;
    for index in 1..=total {
        match session.fetch_email(index).await {
            Ok(FetchOutcome::Fetched(raw)) => {
                let path = config.ingest.spool_dir.join(format!("msg-{index}.eml"));
                tokio::fs::write(&path, raw.as_bytes()).await?;
                tracing::info!("Message {index} spooled to {}", path.display());
                fetched += 1;

                if config.ingest.delete_after_fetch {
                    match session.delete_message(index).await {
                        Ok(()) => deleted += 1,
                        Err(err) => {
                            tracing::warn!("Could not mark message {index} for deletion: {err}")
                        }
                    }
                }
            }
            Ok(FetchOutcome::AlreadyRead) => {
                tracing::debug!("Message {index} already read, skipping");
            }
            Err(err) => {
                tracing::warn!("Fetch of message {index} failed: {err}");
            }
        }
    }

    if deleted > 0 {
        if let Err(err) = session.expunge_messages().await {
            tracing::warn!("Expunge failed: {err}");
        }
    }

    session.disconnect().await;
    tracing::info!("Done: {fetched} fetched, {deleted} deleted");

    Ok(())
}
