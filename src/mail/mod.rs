pub mod endpoint;
pub mod factory;
pub mod imap;
pub mod pop3;
pub mod session;
pub mod stream;
pub mod transport;

pub use session::{FetchOutcome, MailSession};
