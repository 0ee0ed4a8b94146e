use std::pin::Pin;
use std::task::{Context, Poll};

use async_native_tls::TlsStream;
use futures::io::{AsyncRead, AsyncWrite};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::mail::transport::TransportError;

/// Wrapper for either a TLS or a plaintext connection to the mail server.
pub enum MailStream {
    Tls(TlsStream<Compat<TcpStream>>),
    Plain(Compat<TcpStream>),
}

impl MailStream {
    pub fn plain(tcp: TcpStream) -> Self {
        MailStream::Plain(tcp.compat())
    }

    /// Wrap the connection in TLS, honoring the certificate policy.
    pub async fn secure(
        host: &str,
        tcp: TcpStream,
        accept_invalid_certs: bool,
    ) -> Result<Self, TransportError> {
        let connector =
            async_native_tls::TlsConnector::new().danger_accept_invalid_certs(accept_invalid_certs);
        let tls = connector.connect(host, tcp.compat()).await?;
        Ok(MailStream::Tls(tls))
    }
}

/// Read one CRLF-terminated line from a still-plaintext connection,
/// before any protocol library or TLS layer takes over the stream.
/// Reads byte by byte so nothing past the line is consumed.
pub async fn read_raw_line(tcp: &mut TcpStream) -> Result<String, TransportError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        tcp.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Send one command line on a still-plaintext connection.
pub async fn write_raw_line(tcp: &mut TcpStream, command: &str) -> Result<(), TransportError> {
    tcp.write_all(command.as_bytes()).await?;
    tcp.write_all(b"\r\n").await?;
    tcp.flush().await?;
    Ok(())
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            MailStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            MailStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s).poll_flush(cx),
            MailStream::Plain(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Tls(s) => Pin::new(s).poll_close(cx),
            MailStream::Plain(s) => Pin::new(s).poll_close(cx),
        }
    }
}

impl std::fmt::Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailStream::Tls(_) => write!(f, "MailStream::Tls"),
            MailStream::Plain(_) => write!(f, "MailStream::Plain"),
        }
    }
}

unsafe impl Send for MailStream {}
impl Unpin for MailStream {}
