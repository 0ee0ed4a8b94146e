use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    /// One of: imap, imap-ssl, pop3-ssl (case-insensitive)
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// Upgrade plaintext connections with STARTTLS
    pub starttls: bool,
    /// Refuse self-signed server certificates
    pub validate_cert: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Where fetched raw messages are written as .eml files
    pub spool_dir: PathBuf,
    pub delete_after_fetch: bool,
    /// Replay mode: count unseen messages and fetch regardless of flags
    pub debug_mode: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            mailbox: MailboxConfig {
                protocol: std::env::var("MAILBOX_PROTOCOL")
                    .unwrap_or_else(|_| "imap-ssl".to_string()),
                host: std::env::var("MAILBOX_HOST")?,
                port: std::env::var("MAILBOX_PORT")
                    .unwrap_or_else(|_| "993".to_string())
                    .parse()?,
                login: std::env::var("MAILBOX_LOGIN")?,
                password: std::env::var("MAILBOX_PASSWORD").unwrap_or_else(|_| String::new()),
                starttls: std::env::var("MAILBOX_STARTTLS")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
                validate_cert: std::env::var("MAILBOX_VALIDATE_CERT")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
            },
            ingest: IngestConfig {
                spool_dir: PathBuf::from(
                    std::env::var("INGEST_SPOOL_DIR").unwrap_or_else(|_| "./spool".to_string()),
                ),
                delete_after_fetch: std::env::var("INGEST_DELETE_AFTER_FETCH")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
                debug_mode: std::env::var("INGEST_DEBUG_MODE")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
            },
        })
    }
}
