use async_imap::types::Flag;
use async_imap::Session;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;

use crate::mail::endpoint::{Endpoint, TlsMode};
use crate::mail::stream::{self, MailStream};
use crate::mail::transport::{MailTransport, MessageFlags, TransportError};

/// IMAP transport backed by async-imap. Handles plain, implicit-SSL and
/// STARTTLS connections; the mailbox from the endpoint is selected at
/// open so sequence numbers stay valid for the whole session.
pub struct ImapTransport {
    session: Option<Session<MailStream>>,
}

impl ImapTransport {
    pub fn new() -> Self {
        Self { session: None }
    }

    fn session(&mut self) -> Result<&mut Session<MailStream>, TransportError> {
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }

    /// STARTTLS negotiation on the raw stream, before async-imap owns it.
    async fn negotiate_starttls(tcp: &mut TcpStream) -> Result<(), TransportError> {
        let greeting = stream::read_raw_line(tcp).await?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(TransportError::Rejected {
                command: "greeting".to_string(),
                reply: greeting,
            });
        }

        stream::write_raw_line(tcp, "a0 STARTTLS").await?;
        loop {
            let line = stream::read_raw_line(tcp).await?;
            if let Some(status) = line.strip_prefix("a0 ") {
                if status.starts_with("OK") {
                    return Ok(());
                }
                return Err(TransportError::Rejected {
                    command: "STARTTLS".to_string(),
                    reply: line,
                });
            }
        }
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn open(
        &mut self,
        endpoint: &Endpoint,
        login: &str,
        password: &str,
    ) -> Result<(), TransportError> {
        let mut tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;

        let stream = if endpoint.ssl {
            MailStream::secure(&endpoint.host, tcp, endpoint.accept_invalid_certs()).await?
        } else if endpoint.tls_mode == TlsMode::Opportunistic {
            Self::negotiate_starttls(&mut tcp).await?;
            MailStream::secure(&endpoint.host, tcp, endpoint.accept_invalid_certs()).await?
        } else {
            MailStream::plain(tcp)
        };

        let client = async_imap::Client::new(stream);
        let mut session = client
            .login(login, password)
            .await
            .map_err(|(err, _)| TransportError::from(err))?;

        session.select(endpoint.mailbox()).await?;
        self.session = Some(session);
        Ok(())
    }

    async fn message_count(&mut self) -> Result<u32, TransportError> {
        let sequences = self.session()?.search("ALL").await?;
        Ok(sequences.len() as u32)
    }

    async fn unseen_count(&mut self) -> Result<u32, TransportError> {
        let sequences = self.session()?.search("UNSEEN").await?;
        Ok(sequences.len() as u32)
    }

    async fn message_flags(&mut self, index: u32) -> Result<MessageFlags, TransportError> {
        let session = self.session()?;
        let mut flags = None;
        {
            let mut fetches = session.fetch(index.to_string(), "(FLAGS)").await?;
            while let Some(item) = fetches.next().await {
                let fetch = item?;
                flags = Some(MessageFlags {
                    seen: fetch.flags().any(|f| matches!(f, Flag::Seen)),
                    recent: fetch.flags().any(|f| matches!(f, Flag::Recent)),
                });
            }
        }
        flags.ok_or_else(|| {
            TransportError::Malformed(format!("no FLAGS response for message {index}"))
        })
    }

    async fn fetch_raw(&mut self, index: u32) -> Result<String, TransportError> {
        let session = self.session()?;
        let mut header = None;
        let mut text = None;
        {
            let mut fetches = session
                .fetch(index.to_string(), "(RFC822.HEADER RFC822.TEXT)")
                .await?;
            while let Some(item) = fetches.next().await {
                let fetch = item?;
                if let Some(bytes) = fetch.header() {
                    header = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                if let Some(bytes) = fetch.text() {
                    text = Some(String::from_utf8_lossy(bytes).into_owned());
                }
            }
        }

        let header = header.ok_or_else(|| {
            TransportError::Malformed(format!("no header returned for message {index}"))
        })?;
        Ok(format!("{}{}", header, text.unwrap_or_default()))
    }

    async fn mark_deleted(&mut self, index: u32) -> Result<(), TransportError> {
        let session = self.session()?;
        let updates = session
            .store(index.to_string(), "+FLAGS (\\Deleted)")
            .await?;
        tokio::pin!(updates);
        while let Some(update) = updates.next().await {
            update?;
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<(), TransportError> {
        let session = self.session()?;
        let expunged = session.expunge().await?;
        tokio::pin!(expunged);
        while let Some(seq) = expunged.next().await {
            seq?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut session) = self.session.take() {
            session.logout().await?;
        }
        Ok(())
    }
}
