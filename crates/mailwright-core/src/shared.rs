//! A message shared between threads.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::compose::Composer;
use crate::error::{ComposeErrors, SendError};
use crate::message::Message;
use crate::sender::Sender;
use crate::transport::Transport;

/// A [`Message`] behind a reader/writer lock.
///
/// Cloning the handle shares the message. Use [`snapshot`](Self::snapshot)
/// for an independent copy, for example to send a prepared template
/// message to many recipients concurrently.
#[derive(Debug, Clone, Default)]
pub struct SharedMessage {
    inner: Arc<RwLock<Message>>,
}

impl SharedMessage {
    /// Wraps `message`.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            inner: Arc::new(RwLock::new(message)),
        }
    }

    /// Runs `f` with shared access to the message.
    pub fn read<R>(&self, f: impl FnOnce(&Message) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Runs `f` with exclusive access to the message.
    pub fn update<R>(&self, f: impl FnOnce(&mut Message) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Returns an independent copy of the message.
    #[must_use]
    pub fn snapshot(&self) -> Message {
        self.read(Message::clone)
    }

    /// Composes the message, holding the write lock throughout.
    ///
    /// # Errors
    ///
    /// See [`Composer::compose`].
    pub fn compose<T: Serialize>(
        &self,
        composer: &Composer,
        data: &T,
    ) -> Result<Vec<u8>, ComposeErrors> {
        self.update(|message| composer.compose(message, data))
    }

    /// Composes and sends the message through `sender`, holding the write
    /// lock throughout.
    ///
    /// # Errors
    ///
    /// See [`Sender::send`].
    pub fn send<T, X>(
        &self,
        sender: &Arc<Sender>,
        composer: &Composer,
        data: &T,
        transport: &X,
    ) -> Result<(), SendError>
    where
        T: Serialize,
        X: Transport + ?Sized,
    {
        self.update(|message| sender.send(composer, message, data, transport))
    }
}
