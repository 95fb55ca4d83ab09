//! Error types for the core library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors in sender configuration, reported when a [`Sender`](crate::Sender)
/// is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Host is empty.
    #[error("SMTP host is required")]
    EmptyHost,

    /// Port suffix of the host is not a number in 1-65535.
    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    /// Username is empty.
    #[error("SMTP username is required")]
    EmptyUsername,

    /// Password is empty.
    #[error("SMTP password is required")]
    EmptyPassword,

    /// Sender address is not a valid email address.
    #[error("Invalid sender address: {0}")]
    InvalidAddress(#[from] mailwright_mime::Error),
}

/// Template parsing and rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Template source has a syntax error.
    #[error("Invalid template: {0}")]
    Parse(String),

    /// Rendering with the supplied data failed.
    #[error("Template rendering failed: {0}")]
    Render(String),
}

/// A single problem found while composing a message.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Neither the message, its sender nor the default sender has a From address.
    #[error("No From address")]
    NoFromAddress,

    /// The subject template failed to render.
    #[error("Failed to render subject template: {0}")]
    SubjectTemplate(#[source] TemplateError),

    /// A body part template failed to render.
    #[error("Failed to render template of part {index}: {source}")]
    PartTemplate {
        /// Position of the part in the message.
        index: usize,
        /// Underlying template error.
        #[source]
        source: TemplateError,
    },

    /// The message has no body parts.
    #[error("Message has no parts")]
    NoParts,

    /// A file referenced by an attachment or related item could not be read.
    #[error("Cannot read file {}: {source}", path.display())]
    Payload {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Every problem found by one compose or prepare call, in the order found.
///
/// Never empty when returned as an error.
#[derive(Debug, Default)]
pub struct ComposeErrors(Vec<ComposeError>);

impl ComposeErrors {
    pub(crate) const fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, error: ComposeError) {
        self.0.push(error);
    }

    pub(crate) fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Returns `Err(self)` when any error was collected.
    pub(crate) fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no error was collected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the errors in the order they were found.
    pub fn iter(&self) -> std::slice::Iter<'_, ComposeError> {
        self.0.iter()
    }

    /// Returns the errors as a vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<ComposeError> {
        self.0
    }
}

impl From<ComposeError> for ComposeErrors {
    fn from(error: ComposeError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ComposeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to compose message")?;
        for (i, error) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ComposeErrors {}

impl<'a> IntoIterator for &'a ComposeErrors {
    type Item = &'a ComposeError;
    type IntoIter = std::slice::Iter<'a, ComposeError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for ComposeErrors {
    type Item = ComposeError;
    type IntoIter = std::vec::IntoIter<ComposeError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Errors that can occur while sending a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// No sender was given and the registry has no default.
    #[error("No default sender")]
    NoDefaultSender,

    /// The message could not be composed.
    #[error(transparent)]
    Compose(#[from] ComposeErrors),

    /// The transport failed to deliver the message.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_errors_display() {
        let mut errors = ComposeErrors::new();
        errors.push(ComposeError::NoParts);
        errors.push(ComposeError::PartTemplate {
            index: 1,
            source: TemplateError::Render("missing helper".into()),
        });
        assert_eq!(
            errors.to_string(),
            "failed to compose message: Message has no parts; \
             Failed to render template of part 1: Template rendering failed: missing helper"
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_into_result() {
        assert!(ComposeErrors::new().into_result().is_ok());
        let errors = ComposeErrors::from(ComposeError::NoFromAddress);
        assert!(!errors.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors.into_result().is_err());
        assert!(ComposeErrors::new().is_empty());
    }
}
