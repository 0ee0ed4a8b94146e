/// Which mailbox protocol a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Imap,
    Pop3,
}

impl ProtocolKind {
    /// Protocol name as it appears in the endpoint descriptor.
    pub fn service_name(self) -> &'static str {
        match self {
            ProtocolKind::Imap => "imap",
            ProtocolKind::Pop3 => "pop3",
        }
    }
}

/// TLS negotiation requested for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// No preference stated either way.
    None,
    /// Upgrade to TLS after the initial plaintext handshake (STARTTLS/STLS).
    Opportunistic,
    /// Explicitly no TLS negotiation.
    #[default]
    Disabled,
}

/// How strictly the server certificate is checked on encrypted connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertPolicy {
    /// Tolerate self-signed or otherwise unverifiable certificates.
    #[default]
    AcceptSelfSigned,
    RequireValid,
}

/// Where and how to reach a mailbox. Composed once at connect time;
/// the rendered descriptor never changes for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: ProtocolKind,
    pub ssl: bool,
    pub tls_mode: TlsMode,
    pub cert_policy: CertPolicy,
    pub host: String,
    pub port: u16,
    mailbox: Option<&'static str>,
}

impl Endpoint {
    pub fn new(
        kind: ProtocolKind,
        ssl: bool,
        tls_mode: TlsMode,
        cert_policy: CertPolicy,
        host: &str,
        port: u16,
    ) -> Self {
        // Google's IMAP frontends select a non-standard default mailbox,
        // so the descriptor names INBOX explicitly for those hosts.
        let mailbox = if is_google_host(host) {
            Some("INBOX")
        } else {
            None
        };

        Self {
            kind,
            ssl,
            tls_mode,
            cert_policy,
            host: host.to_string(),
            port,
            mailbox,
        }
    }

    /// Render the c-client style connection string, e.g.
    /// `{imap.gmail.com:993/service=imap/ssl/notls/novalidate-cert}INBOX`.
    pub fn descriptor(&self) -> String {
        let mut options = format!("/service={}", self.kind.service_name());
        if self.ssl {
            options.push_str("/ssl");
        }
        if self.tls_mode == TlsMode::Opportunistic {
            options.push_str("/tls");
        } else {
            options.push_str("/notls");
        }
        if self.cert_policy == CertPolicy::AcceptSelfSigned {
            options.push_str("/novalidate-cert");
        }

        let mut descriptor = format!("{{{}:{}{}}}", self.host, self.port, options);
        if let Some(mailbox) = self.mailbox {
            descriptor.push_str(mailbox);
        }
        descriptor
    }

    /// Mailbox to select once connected.
    pub fn mailbox(&self) -> &str {
        self.mailbox.unwrap_or("INBOX")
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.cert_policy == CertPolicy::AcceptSelfSigned
    }
}

fn is_google_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host.contains("google") || host.contains("gmail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_imap_descriptor() {
        let endpoint = Endpoint::new(
            ProtocolKind::Imap,
            false,
            TlsMode::Disabled,
            CertPolicy::AcceptSelfSigned,
            "mail.example.com",
            143,
        );
        assert_eq!(
            endpoint.descriptor(),
            "{mail.example.com:143/service=imap/notls/novalidate-cert}"
        );
    }

    #[test]
    fn test_ssl_with_valid_cert_descriptor() {
        let endpoint = Endpoint::new(
            ProtocolKind::Imap,
            true,
            TlsMode::Disabled,
            CertPolicy::RequireValid,
            "mail.example.com",
            993,
        );
        assert_eq!(
            endpoint.descriptor(),
            "{mail.example.com:993/service=imap/ssl/notls}"
        );
    }

    #[test]
    fn test_opportunistic_tls_renders_tls_flag() {
        let endpoint = Endpoint::new(
            ProtocolKind::Imap,
            false,
            TlsMode::Opportunistic,
            CertPolicy::AcceptSelfSigned,
            "mail.example.com",
            143,
        );
        assert_eq!(
            endpoint.descriptor(),
            "{mail.example.com:143/service=imap/tls/novalidate-cert}"
        );
    }

    #[test]
    fn test_pop3_ssl_descriptor() {
        let endpoint = Endpoint::new(
            ProtocolKind::Pop3,
            true,
            TlsMode::Disabled,
            CertPolicy::AcceptSelfSigned,
            "pop.example.com",
            995,
        );
        assert_eq!(
            endpoint.descriptor(),
            "{pop.example.com:995/service=pop3/ssl/notls/novalidate-cert}"
        );
    }

    #[test]
    fn test_google_hosts_get_explicit_inbox() {
        for host in ["imap.gmail.com", "mail.google.com", "MAIL.GOOGLE.COM"] {
            let endpoint = Endpoint::new(
                ProtocolKind::Imap,
                true,
                TlsMode::Disabled,
                CertPolicy::AcceptSelfSigned,
                host,
                993,
            );
            assert!(
                endpoint.descriptor().ends_with("}INBOX"),
                "expected INBOX suffix for {host}"
            );
        }
    }

    #[test]
    fn test_other_hosts_get_no_mailbox_path() {
        let endpoint = Endpoint::new(
            ProtocolKind::Imap,
            true,
            TlsMode::Disabled,
            CertPolicy::AcceptSelfSigned,
            "mail.example.com",
            993,
        );
        assert!(endpoint.descriptor().ends_with('}'));
        assert_eq!(endpoint.mailbox(), "INBOX");
    }

    #[test]
    fn test_descriptor_is_deterministic() {
        let build = || {
            Endpoint::new(
                ProtocolKind::Pop3,
                true,
                TlsMode::Opportunistic,
                CertPolicy::RequireValid,
                "pop.example.com",
                995,
            )
            .descriptor()
        };
        assert_eq!(build(), build());
    }
}
