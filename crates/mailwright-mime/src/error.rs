//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Email address failed the validity check.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Mailbox text could not be split into display name and address.
    #[error("Invalid mailbox: {0}")]
    InvalidMailbox(String),
}
