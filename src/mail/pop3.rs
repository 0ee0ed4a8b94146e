use async_trait::async_trait;
use futures::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _};
use futures::io::{BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::mail::endpoint::{Endpoint, TlsMode};
use crate::mail::stream::{self, MailStream};
use crate::mail::transport::{MailTransport, MessageFlags, TransportError};

/// Minimal POP3 transport. No crate in our stack speaks POP3, so the
/// handful of commands this client needs (USER/PASS, STAT, RETR, DELE,
/// QUIT, STLS) are implemented directly over the line protocol.
///
/// POP3 keeps no per-message read state: every message reports as
/// unseen so the session always fetches, and the unseen count equals
/// the total. Deletions are committed by the server at QUIT, which
/// makes the explicit expunge a no-op here.
pub struct Pop3Transport {
    link: Option<Pop3Link<MailStream>>,
}

impl Pop3Transport {
    pub fn new() -> Self {
        Self { link: None }
    }

    fn link(&mut self) -> Result<&mut Pop3Link<MailStream>, TransportError> {
        self.link.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl MailTransport for Pop3Transport {
    async fn open(
        &mut self,
        endpoint: &Endpoint,
        login: &str,
        password: &str,
    ) -> Result<(), TransportError> {
        let mut tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;

        let mut link = if endpoint.ssl {
            // Implicit SSL: the greeting arrives over the encrypted channel.
            let secured =
                MailStream::secure(&endpoint.host, tcp, endpoint.accept_invalid_certs()).await?;
            let mut link = Pop3Link::new(secured);
            let greeting = link.read_status_line().await?;
            check_ok("greeting", greeting)?;
            link
        } else {
            let greeting = stream::read_raw_line(&mut tcp).await?;
            check_ok("greeting", greeting)?;

            if endpoint.tls_mode == TlsMode::Opportunistic {
                stream::write_raw_line(&mut tcp, "STLS").await?;
                let reply = stream::read_raw_line(&mut tcp).await?;
                check_ok("STLS", reply)?;
                let secured =
                    MailStream::secure(&endpoint.host, tcp, endpoint.accept_invalid_certs())
                        .await?;
                Pop3Link::new(secured)
            } else {
                Pop3Link::new(MailStream::plain(tcp))
            }
        };

        link.command(&format!("USER {login}")).await?;
        link.command(&format!("PASS {password}")).await?;

        self.link = Some(link);
        Ok(())
    }

    async fn message_count(&mut self) -> Result<u32, TransportError> {
        let reply = self.link()?.command("STAT").await?;
        parse_stat(&reply)
    }

    async fn unseen_count(&mut self) -> Result<u32, TransportError> {
        self.message_count().await
    }

    async fn message_flags(&mut self, _index: u32) -> Result<MessageFlags, TransportError> {
        self.link()?;
        Ok(MessageFlags {
            seen: false,
            recent: true,
        })
    }

    async fn fetch_raw(&mut self, index: u32) -> Result<String, TransportError> {
        let link = self.link()?;
        link.command(&format!("RETR {index}")).await?;
        link.read_multiline().await
    }

    async fn mark_deleted(&mut self, index: u32) -> Result<(), TransportError> {
        self.link()?.command(&format!("DELE {index}")).await?;
        Ok(())
    }

    async fn expunge(&mut self) -> Result<(), TransportError> {
        // Committed server-side when QUIT is sent at close.
        self.link()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut link) = self.link.take() {
            link.command("QUIT").await?;
        }
        Ok(())
    }
}

/// Buffered line-oriented view of the server connection.
struct Pop3Link<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S> Pop3Link<S>
where
    S: futures::io::AsyncRead + futures::io::AsyncWrite + Send + Unpin,
{
    fn new(stream: S) -> Self {
        let (read_half, write_half) = stream.split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Send one command and check the single-line status reply.
    async fn command(&mut self, command: &str) -> Result<String, TransportError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let reply = self.read_status_line().await?;
        check_ok(command_keyword(command), reply)
    }

    async fn read_status_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(TransportError::Malformed(
                "connection closed by server".to_string(),
            ));
        }
        Ok(line.trim_end().to_string())
    }

    /// Read a multi-line response body up to the terminating "." line,
    /// undoing POP3 dot-stuffing as it goes.
    async fn read_multiline(&mut self) -> Result<String, TransportError> {
        let mut body = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(TransportError::Malformed(
                    "connection closed mid-response".to_string(),
                ));
            }
            if line == ".\r\n" || line == ".\n" {
                return Ok(body);
            }
            match line.strip_prefix('.') {
                Some(stuffed) => body.push_str(stuffed),
                None => body.push_str(&line),
            }
        }
    }
}

fn check_ok(command: &str, reply: String) -> Result<String, TransportError> {
    if reply.starts_with("+OK") {
        Ok(reply)
    } else {
        Err(TransportError::Rejected {
            command: command.to_string(),
            reply,
        })
    }
}

/// First word of a command, so credentials never end up in error text.
fn command_keyword(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

/// Parse the message count out of a STAT reply like `+OK 7 25571`.
fn parse_stat(reply: &str) -> Result<u32, TransportError> {
    reply
        .split_whitespace()
        .nth(1)
        .and_then(|count| count.parse().ok())
        .ok_or_else(|| TransportError::Malformed(format!("unparseable STAT reply: {reply}")))
}
