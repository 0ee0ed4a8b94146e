use anyhow::bail;

use crate::mail::endpoint::{CertPolicy, ProtocolKind};
use crate::mail::imap::ImapTransport;
use crate::mail::pop3::Pop3Transport;
use crate::mail::session::MailSession;
use crate::mail::transport::MailTransport;

/// Build a session for one of the supported protocol identifiers:
/// `imap`, `imap-ssl` or `pop3-ssl` (case-insensitive).
///
/// An unknown identifier is a configuration error, not a runtime
/// condition; the caller is expected to abort on it.
pub fn create_session(identifier: &str, debug_mode: bool) -> anyhow::Result<MailSession> {
    let (kind, ssl) = match identifier.to_ascii_lowercase().as_str() {
        "imap" => (ProtocolKind::Imap, false),
        "imap-ssl" => (ProtocolKind::Imap, true),
        "pop3-ssl" => (ProtocolKind::Pop3, true),
        other => bail!("unsupported mailbox protocol {other:?}, expected imap, imap-ssl or pop3-ssl"),
    };

    let transport: Box<dyn MailTransport> = match kind {
        ProtocolKind::Imap => Box::new(ImapTransport::new()),
        ProtocolKind::Pop3 => Box::new(Pop3Transport::new()),
    };

    Ok(MailSession::new(
        kind,
        ssl,
        CertPolicy::AcceptSelfSigned,
        debug_mode,
        transport,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_mapping() {
        let session = create_session("imap", false).unwrap();
        assert_eq!(session.protocol_kind(), ProtocolKind::Imap);
        assert!(!session.ssl_enabled());

        let session = create_session("imap-ssl", false).unwrap();
        assert_eq!(session.protocol_kind(), ProtocolKind::Imap);
        assert!(session.ssl_enabled());

        let session = create_session("pop3-ssl", false).unwrap();
        assert_eq!(session.protocol_kind(), ProtocolKind::Pop3);
        assert!(session.ssl_enabled());
    }

    #[test]
    fn test_identifiers_are_case_insensitive() {
        let session = create_session("IMAP-SSL", false).unwrap();
        assert_eq!(session.protocol_kind(), ProtocolKind::Imap);
        assert!(session.ssl_enabled());

        assert!(create_session("Pop3-SSL", false).is_ok());
    }

    #[test]
    fn test_unsupported_identifier_fails() {
        for identifier in ["smtp", "pop3", "imaps", ""] {
            let result = create_session(identifier, false);
            assert!(result.is_err(), "{identifier:?} must be rejected");
        }
    }
}
