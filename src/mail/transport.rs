use async_trait::async_trait;
use thiserror::Error;

use crate::mail::endpoint::Endpoint;

/// Errors reported by a mailbox transport. These never cross the
/// `MailSession` boundary as panics; the session converts them to
/// booleans, logs, or recoverable results.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] async_native_tls::Error),

    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    #[error("server rejected {command}: {reply}")]
    Rejected { command: String, reply: String },

    #[error("malformed server response: {0}")]
    Malformed(String),

    #[error("not connected to a mailbox")]
    NotConnected,
}

/// Server-maintained read-state markers for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFlags {
    pub seen: bool,
    pub recent: bool,
}

/// Trait defining the operations a mailbox protocol must provide.
/// Message indices are 1-based sequence numbers in both IMAP and POP3.
#[async_trait]
pub trait MailTransport: Send {
    /// Open the connection and authenticate. After success the other
    /// operations may be called until `close`.
    async fn open(
        &mut self,
        endpoint: &Endpoint,
        login: &str,
        password: &str,
    ) -> Result<(), TransportError>;

    /// Total number of messages in the selected mailbox.
    async fn message_count(&mut self) -> Result<u32, TransportError>;

    /// Number of messages the server reports as unseen.
    async fn unseen_count(&mut self) -> Result<u32, TransportError>;

    /// Read-state flags for the message at `index`.
    async fn message_flags(&mut self, index: u32) -> Result<MessageFlags, TransportError>;

    /// Raw message at `index`: header and body concatenated.
    async fn fetch_raw(&mut self, index: u32) -> Result<String, TransportError>;

    /// Mark the message at `index` for deletion. Removal happens at expunge.
    async fn mark_deleted(&mut self, index: u32) -> Result<(), TransportError>;

    /// Permanently remove everything marked for deletion.
    async fn expunge(&mut self) -> Result<(), TransportError>;

    /// Close the connection. The transport is unusable afterwards.
    async fn close(&mut self) -> Result<(), TransportError>;
}
