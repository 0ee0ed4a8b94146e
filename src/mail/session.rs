use crate::mail::endpoint::{CertPolicy, Endpoint, ProtocolKind, TlsMode};
use crate::mail::transport::{MailTransport, TransportError};

/// Lifecycle state of a session. A session is single-use: once
/// disconnected, callers construct a new one rather than reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

/// Result of asking for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Raw message, header and body concatenated.
    Fetched(String),
    /// The server flags say this message was already processed;
    /// no body was downloaded.
    AlreadyRead,
}

/// One connection to a remote mailbox.
///
/// The session owns its transport exclusively and drives it from a
/// single caller: connect, inspect counts, fetch by 1-based index,
/// optionally mark/expunge deletions, then disconnect. Transport
/// failures never panic out of here; `connect` reports a boolean,
/// the rest return recoverable results, and the most recent error
/// text is always available from [`error`](Self::error).
pub struct MailSession {
    kind: ProtocolKind,
    ssl: bool,
    tls_mode: TlsMode,
    cert_policy: CertPolicy,
    debug_mode: bool,
    state: ConnectionState,
    descriptor: Option<String>,
    transport: Box<dyn MailTransport>,
    last_error: Option<String>,
}

impl MailSession {
    /// Pure configuration; no I/O happens until `connect`.
    ///
    /// With `debug_mode` set the session reports unseen rather than
    /// total message counts and fetches messages regardless of their
    /// read state, so already-processed mail can be replayed.
    pub fn new(
        kind: ProtocolKind,
        ssl: bool,
        cert_policy: CertPolicy,
        debug_mode: bool,
        transport: Box<dyn MailTransport>,
    ) -> Self {
        Self {
            kind,
            ssl,
            tls_mode: TlsMode::default(),
            cert_policy,
            debug_mode,
            state: ConnectionState::Disconnected,
            descriptor: None,
            transport,
            last_error: None,
        }
    }

    /// Request a STARTTLS upgrade after the plaintext handshake.
    /// Only honored before `connect`.
    pub fn enable_starttls(&mut self) {
        if self.is_connected() {
            tracing::debug!("enable_starttls ignored on a connected session");
            return;
        }
        self.tls_mode = TlsMode::Opportunistic;
    }

    /// Demand a CA-verified server certificate instead of tolerating
    /// self-signed ones. Only honored before `connect`.
    pub fn require_valid_certificate(&mut self) {
        if self.is_connected() {
            tracing::debug!("require_valid_certificate ignored on a connected session");
            return;
        }
        self.cert_policy = CertPolicy::RequireValid;
    }

    pub fn protocol_kind(&self) -> ProtocolKind {
        self.kind
    }

    pub fn ssl_enabled(&self) -> bool {
        self.ssl
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Connection string composed at connect time; `None` until then.
    pub fn endpoint_descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }

    /// Open the mailbox connection. Returns `false` on failure with the
    /// cause recorded for [`error`](Self::error); never panics.
    pub async fn connect(&mut self, host: &str, port: u16, login: &str, password: &str) -> bool {
        if self.is_connected() {
            tracing::debug!("connect called on an already connected session");
            return true;
        }

        let endpoint = Endpoint::new(
            self.kind,
            self.ssl,
            self.tls_mode,
            self.cert_policy,
            host,
            port,
        );
        let descriptor = endpoint.descriptor();
        tracing::info!("Connecting to {descriptor}");

        match self.transport.open(&endpoint, login, password).await {
            Ok(()) => {
                self.descriptor = Some(descriptor);
                self.state = ConnectionState::Connected;
                tracing::info!("Mailbox login successful for {login}");
                true
            }
            Err(err) => {
                tracing::warn!("Mailbox connection failed: {err}");
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    /// Number of messages to process: the mailbox total, or the unseen
    /// count in debug mode. A failed status query is logged and reported
    /// as zero so a processing loop can keep going.
    pub async fn number_of_messages(&mut self) -> u32 {
        let result = if self.debug_mode {
            self.transport.unseen_count().await
        } else {
            self.transport.message_count().await
        };

        match result {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("Mailbox status query failed: {err}");
                self.last_error = Some(err.to_string());
                0
            }
        }
    }

    /// Fetch the raw message at `index` (1-based).
    ///
    /// A message the server already flags as seen comes back as
    /// [`FetchOutcome::AlreadyRead`] without a download round trip,
    /// whether or not it is still recent; that is how each message gets
    /// processed exactly once with no tracking state outside the
    /// mailbox. Debug mode bypasses the gate. Indices outside
    /// `1..=number_of_messages()` are not checked here; the transport
    /// decides what happens.
    pub async fn fetch_email(&mut self, index: u32) -> Result<FetchOutcome, TransportError> {
        let flags = self.transport.message_flags(index).await;
        let flags = self.record(flags)?;

        if self.debug_mode || !flags.seen {
            let raw = self.transport.fetch_raw(index).await;
            let raw = self.record(raw)?;
            Ok(FetchOutcome::Fetched(raw))
        } else {
            Ok(FetchOutcome::AlreadyRead)
        }
    }

    /// Mark the message at `index` for deletion on the server. Nothing
    /// is removed until `expunge_messages`.
    pub async fn delete_message(&mut self, index: u32) -> Result<(), TransportError> {
        let result = self.transport.mark_deleted(index).await;
        self.record(result)
    }

    /// Permanently remove everything marked for deletion. Irreversible.
    pub async fn expunge_messages(&mut self) -> Result<(), TransportError> {
        let result = self.transport.expunge().await;
        self.record(result)
    }

    /// Close the connection and release the transport link. Safe to call
    /// when already disconnected.
    pub async fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        if let Err(err) = self.transport.close().await {
            tracing::warn!("Error while closing mailbox connection: {err}");
            self.last_error = Some(err.to_string());
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Most recent transport error message, empty when none. Advisory
    /// only; always safe to call.
    pub fn error(&self) -> &str {
        self.last_error.as_deref().unwrap_or("")
    }

    fn record<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::transport::MessageFlags;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubTransport {
        fail_open: bool,
        fail_status: bool,
        total: u32,
        unseen: u32,
        flags: MessageFlags,
        raw_fetches: Arc<AtomicU32>,
        open_calls: Arc<AtomicU32>,
        close_calls: Arc<AtomicU32>,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                fail_open: false,
                fail_status: false,
                total: 10,
                unseen: 3,
                flags: MessageFlags {
                    seen: true,
                    recent: true,
                },
                raw_fetches: Arc::new(AtomicU32::new(0)),
                open_calls: Arc::new(AtomicU32::new(0)),
                close_calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl MailTransport for StubTransport {
        async fn open(
            &mut self,
            _endpoint: &Endpoint,
            _login: &str,
            _password: &str,
        ) -> Result<(), TransportError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(TransportError::Rejected {
                    command: "LOGIN".to_string(),
                    reply: "NO invalid credentials".to_string(),
                });
            }
            Ok(())
        }

        async fn message_count(&mut self) -> Result<u32, TransportError> {
            if self.fail_status {
                return Err(TransportError::Malformed(
                    "status query failed".to_string(),
                ));
            }
            Ok(self.total)
        }

        async fn unseen_count(&mut self) -> Result<u32, TransportError> {
            if self.fail_status {
                return Err(TransportError::Malformed(
                    "status query failed".to_string(),
                ));
            }
            Ok(self.unseen)
        }

        async fn message_flags(&mut self, _index: u32) -> Result<MessageFlags, TransportError> {
            Ok(self.flags)
        }

        async fn fetch_raw(&mut self, _index: u32) -> Result<String, TransportError> {
            self.raw_fetches.fetch_add(1, Ordering::SeqCst);
            Ok("Subject: hello\r\n\r\nbody\r\n".to_string())
        }

        async fn mark_deleted(&mut self, _index: u32) -> Result<(), TransportError> {
            Ok(())
        }

        async fn expunge(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session_with(stub: StubTransport, debug_mode: bool) -> MailSession {
        MailSession::new(
            ProtocolKind::Imap,
            false,
            CertPolicy::AcceptSelfSigned,
            debug_mode,
            Box::new(stub),
        )
    }

    #[tokio::test]
    async fn test_count_selects_total_or_unseen() {
        let mut normal = session_with(StubTransport::new(), false);
        assert!(normal.connect("mail.example.com", 143, "u", "p").await);
        assert_eq!(normal.number_of_messages().await, 10);

        let mut debug = session_with(StubTransport::new(), true);
        assert!(debug.connect("mail.example.com", 143, "u", "p").await);
        assert_eq!(debug.number_of_messages().await, 3);
    }

    #[tokio::test]
    async fn test_status_failure_degrades_to_zero() {
        let mut stub = StubTransport::new();
        stub.fail_status = true;
        let mut session = session_with(stub, false);
        assert!(session.connect("mail.example.com", 143, "u", "p").await);
        assert_eq!(session.number_of_messages().await, 0);
        assert!(session.error().contains("status query failed"));
    }

    #[tokio::test]
    async fn test_seen_and_recent_message_is_skipped() {
        let stub = StubTransport::new();
        let fetches = stub.raw_fetches.clone();
        let mut session = session_with(stub, false);
        assert!(session.connect("mail.example.com", 143, "u", "p").await);

        let outcome = session.fetch_email(1).await.unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyRead);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_debug_mode_fetches_regardless_of_flags() {
        let stub = StubTransport::new();
        let fetches = stub.raw_fetches.clone();
        let mut session = session_with(stub, true);
        assert!(session.connect("mail.example.com", 143, "u", "p").await);

        match session.fetch_email(1).await.unwrap() {
            FetchOutcome::Fetched(raw) => assert!(raw.contains("Subject: hello")),
            FetchOutcome::AlreadyRead => panic!("debug mode must not skip messages"),
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unseen_message_is_fetched() {
        let mut stub = StubTransport::new();
        stub.flags = MessageFlags {
            seen: false,
            recent: true,
        };
        let mut session = session_with(stub, false);
        assert!(session.connect("mail.example.com", 143, "u", "p").await);
        assert!(matches!(
            session.fetch_email(1).await.unwrap(),
            FetchOutcome::Fetched(_)
        ));
    }

    #[tokio::test]
    async fn test_seen_message_skipped_even_when_not_recent() {
        let mut stub = StubTransport::new();
        stub.flags = MessageFlags {
            seen: true,
            recent: false,
        };
        let fetches = stub.raw_fetches.clone();
        let mut session = session_with(stub, false);
        assert!(session.connect("mail.example.com", 143, "u", "p").await);

        let outcome = session.fetch_email(1).await.unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyRead);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let mut stub = StubTransport::new();
        stub.fail_open = true;
        let mut session = session_with(stub, false);

        assert!(!session.connect("mail.example.com", 143, "u", "bad").await);
        assert!(!session.is_connected());
        assert!(session.endpoint_descriptor().is_none());
        assert!(session.error().contains("invalid credentials"));
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let stub = StubTransport::new();
        let closes = stub.close_calls.clone();
        let mut session = session_with(stub, false);

        assert!(session.connect("mail.example.com", 143, "u", "p").await);
        assert!(session.is_connected());

        session.disconnect().await;
        assert!(!session.is_connected());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // A second disconnect must not touch the closed transport.
        session.disconnect().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_descriptor_fixed_at_connect() {
        let stub = StubTransport::new();
        let mut session = session_with(stub, false);
        session.enable_starttls();

        assert!(session.connect("mail.example.com", 143, "u", "p").await);
        assert_eq!(
            session.endpoint_descriptor(),
            Some("{mail.example.com:143/service=imap/tls/novalidate-cert}")
        );

        // Mutators are ignored once connected; the descriptor stays put.
        session.require_valid_certificate();
        assert_eq!(
            session.endpoint_descriptor(),
            Some("{mail.example.com:143/service=imap/tls/novalidate-cert}")
        );
    }
}
