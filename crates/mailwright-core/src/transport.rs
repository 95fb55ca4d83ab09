//! The boundary to the mail transport.
//!
//! Composition ends with a byte buffer; delivering it is the job of a
//! [`Transport`] implementation, such as an SMTP client.

use crate::sender::Sender;

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server refused the sender, a recipient or the message.
    #[error("Send failed: {0}")]
    Rejected(String),
}

/// Envelope information for one delivery.
#[derive(Debug, Clone)]
pub struct Envelope<'a> {
    /// Server and credentials to deliver through.
    pub sender: &'a Sender,
    /// Envelope sender address (`MAIL FROM`).
    pub from: String,
    /// Envelope recipients (`RCPT TO`), without duplicates.
    pub recipients: Vec<String>,
}

/// Delivers composed messages.
pub trait Transport {
    /// Delivers `body` to the envelope recipients.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails. Callers do not retry.
    fn send(&self, envelope: &Envelope<'_>, body: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, envelope: &Envelope<'_>, body: &[u8]) -> Result<(), TransportError> {
        (**self).send(envelope, body)
    }
}
