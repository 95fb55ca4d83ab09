//! Attachments, related inline objects and their byte sources.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::ComposeError;

/// Content type used when an attachment's type cannot be guessed.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Where the bytes of an attachment or related item come from.
///
/// File contents are read during preparation and cached. A clone keeps the
/// path but not the cache, so each copy reads the file itself.
#[derive(Debug)]
pub enum Payload {
    /// Contents of a file, read on demand.
    File {
        /// Filesystem path.
        path: PathBuf,
        /// Contents from the last successful read.
        cache: Option<Bytes>,
    },
    /// Bytes supplied in memory.
    Bytes(Bytes),
}

impl Payload {
    /// Creates a file-backed payload.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            cache: None,
        }
    }

    /// Creates an in-memory payload.
    #[must_use]
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    /// Returns the bytes, or `None` for a file that has not been read yet.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::File { cache, .. } => cache.as_deref(),
            Self::Bytes(data) => Some(data.as_ref()),
        }
    }

    /// Returns the file path of a file-backed payload.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Bytes(_) => None,
        }
    }

    /// Returns true if the payload is backed by a file.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// Reads the file into the cache if it is empty, or always when `force`.
    pub(crate) fn load(&mut self, force: bool) -> Result<(), ComposeError> {
        let Self::File { path, cache } = self else {
            return Ok(());
        };
        if cache.is_some() && !force {
            return Ok(());
        }
        match std::fs::read(&*path) {
            Ok(data) => {
                debug!(path = %path.display(), len = data.len(), "Read payload file");
                *cache = Some(Bytes::from(data));
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read payload file: {e}");
                Err(ComposeError::Payload {
                    path: path.clone(),
                    source: e,
                })
            }
        }
    }
}

impl Clone for Payload {
    fn clone(&self) -> Self {
        match self {
            Self::File { path, .. } => Self::file(path.clone()),
            Self::Bytes(data) => Self::Bytes(data.clone()),
        }
    }
}

/// An object referenced from an HTML part, such as an inline image.
///
/// It is sent inside a `multipart/related` container next to its part,
/// with a `Content-ID` header carrying [`id`](Self::id).
#[derive(Debug, Clone)]
pub struct Related {
    id: String,
    content_type: String,
    payload: Payload,
}

impl Related {
    /// Creates a related item read from a file.
    #[must_use]
    pub fn file(
        id: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            payload: Payload::file(path),
        }
    }

    /// Creates a related item from bytes in memory.
    #[must_use]
    pub fn object(
        id: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            payload: Payload::bytes(data),
        }
    }

    /// Returns the content id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the byte source.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) const fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }
}

/// A file attached to a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    name: String,
    content_type: String,
    payload: Payload,
}

impl Attachment {
    /// Attaches a file, naming it after the file and guessing its type from
    /// the extension.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::named_file("", "", path)
    }

    /// Attaches a file under the given name and type.
    ///
    /// An empty `name` defaults to the file name and an empty
    /// `content_type` to the type guessed from the extension.
    #[must_use]
    pub fn named_file(
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let path = path.into();
        let mut name = name.into();
        let mut content_type = content_type.into();
        if name.is_empty() {
            name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if content_type.is_empty() {
            content_type = guess_content_type(&path);
        }
        Self {
            name,
            content_type,
            payload: Payload::file(path),
        }
    }

    /// Creates an attachment from bytes in memory.
    #[must_use]
    pub fn object(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            payload: Payload::bytes(data),
        }
    }

    /// Returns the file name shown to recipients.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the byte source.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) const fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }
}

/// Guesses a content type from the extension of `path`.
#[must_use]
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map_or_else(|| DEFAULT_CONTENT_TYPE.to_string(), |m| m.essence_str().to_string())
}
