//! SMTP sender configuration and the default sender registry.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use mailwright_mime::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compose::Composer;
use crate::error::{ConfigError, SendError};
use crate::message::Message;
use crate::transport::{Envelope, Transport};

/// Port used when the host does not name one.
pub const DEFAULT_PORT: u16 = 25;

/// Sender configuration as read from a settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Server hostname, optionally followed by `:port`.
    pub host: String,
    /// Server port; overrides a port given in `host`.
    #[serde(default)]
    pub port: Option<u16>,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Sender address, either `addr` or `Name <addr>`.
    #[serde(default)]
    pub address: Option<String>,
}

/// SMTP server, credentials and optional sender address.
///
/// Immutable once constructed; share it with [`Arc`].
#[derive(Clone, PartialEq, Eq)]
pub struct Sender {
    host: String,
    port: u16,
    username: String,
    password: String,
    address: Option<Address>,
}

impl Sender {
    /// Creates a sender.
    ///
    /// `host` may carry a port (`"smtp.example.com:587"`); the default
    /// port is 25.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty, the port is not a number in
    /// 1-65535, or the username or password is empty.
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, ConfigError> {
        let (host, port) = parse_host(host)?;
        if username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        Ok(Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            address: None,
        })
    }

    /// Creates a sender from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is invalid, see [`Sender::new`].
    pub fn from_config(config: &SenderConfig) -> Result<Self, ConfigError> {
        let mut sender = Self::new(&config.host, &config.username, &config.password)?;
        if let Some(port) = config.port {
            if port == 0 {
                return Err(ConfigError::InvalidPort(port.to_string()));
            }
            sender.port = port;
        }
        if let Some(address) = &config.address {
            sender.address = Some(address.parse()?);
        }
        Ok(sender)
    }

    /// Sets the sender address, used as From when a message has none.
    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Returns the server hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the sender address.
    #[must_use]
    pub const fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Composes `message` with `data` and hands it to `transport`.
    ///
    /// The message remembers this sender, so its address is used as From
    /// when the message has none.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Compose`] if the message cannot be composed and
    /// [`SendError::Transport`] if delivery fails.
    pub fn send<T, X>(
        self: &Arc<Self>,
        composer: &Composer,
        message: &mut Message,
        data: &T,
        transport: &X,
    ) -> Result<(), SendError>
    where
        T: Serialize,
        X: Transport + ?Sized,
    {
        message.sender(Arc::clone(self));
        let body = composer.compose(message, data)?;
        let registry = composer.registry();
        let envelope = Envelope {
            sender: self,
            from: message.from_addr(registry).unwrap_or_default(),
            recipients: message.recipient_addrs(registry),
        };
        info!(
            host = %self.host,
            port = self.port,
            recipients = envelope.recipients.len(),
            bytes = body.len(),
            "Sending message"
        );
        transport.send(&envelope, &body)?;
        Ok(())
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

fn parse_host(host: &str) -> Result<(&str, u16), ConfigError> {
    let (name, port) = match host.split_once(':') {
        Some((name, digits)) => {
            if !digits.bytes().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::InvalidPort(host.to_string()));
            }
            let port = if digits.is_empty() {
                0
            } else {
                digits
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(host.to_string()))?
            };
            (name, port)
        }
        None => (host, 0),
    };
    if name.is_empty() {
        return Err(ConfigError::EmptyHost);
    }
    Ok((name, if port == 0 { DEFAULT_PORT } else { port }))
}

/// Holds the default sender, used when a send names no sender.
///
/// Create one per application and pass it to the [`Composer`] and the code
/// that sends mail.
#[derive(Debug, Default)]
pub struct SenderRegistry {
    default: RwLock<Option<Arc<Sender>>>,
}

impl SenderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `sender` the default and returns it.
    pub fn set_default(&self, sender: Arc<Sender>) -> Arc<Sender> {
        debug!(host = %sender.host, "Setting default sender");
        *self.default.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&sender));
        sender
    }

    /// Returns the default sender.
    #[must_use]
    pub fn default_sender(&self) -> Option<Arc<Sender>> {
        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes the default sender.
    pub fn clear(&self) {
        *self.default.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Sends `message` through the default sender.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NoDefaultSender`] if no default is set, otherwise
    /// see [`Sender::send`].
    pub fn send<T, X>(
        &self,
        composer: &Composer,
        message: &mut Message,
        data: &T,
        transport: &X,
    ) -> Result<(), SendError>
    where
        T: Serialize,
        X: Transport + ?Sized,
    {
        let sender = self.default_sender().ok_or(SendError::NoDefaultSender)?;
        sender.send(composer, message, data, transport)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_host_and_port() {
        let sender = Sender::new("smtp.example.com", "user", "pass").unwrap();
        assert_eq!(sender.host(), "smtp.example.com");
        assert_eq!(sender.port(), 25);

        let sender = Sender::new("smtp.example.com:587", "user", "pass").unwrap();
        assert_eq!(sender.host(), "smtp.example.com");
        assert_eq!(sender.port(), 587);

        let sender = Sender::new("smtp.example.com:", "user", "pass").unwrap();
        assert_eq!(sender.port(), 25);
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(
            Sender::new("smtp.example.com:58x", "user", "pass"),
            Err(ConfigError::InvalidPort("smtp.example.com:58x".into()))
        );
        assert_eq!(
            Sender::new("smtp.example.com:70000", "user", "pass"),
            Err(ConfigError::InvalidPort("smtp.example.com:70000".into()))
        );
        assert_eq!(Sender::new(":25", "user", "pass"), Err(ConfigError::EmptyHost));
        assert_eq!(
            Sender::new("smtp.example.com", "", "pass"),
            Err(ConfigError::EmptyUsername)
        );
        assert_eq!(
            Sender::new("smtp.example.com", "user", ""),
            Err(ConfigError::EmptyPassword)
        );
    }

    #[test]
    fn test_from_config() {
        let config: SenderConfig = serde_json::from_str(
            r#"{
                "host": "smtp.example.com",
                "port": 465,
                "username": "user",
                "password": "secret",
                "address": "Mail Bot <bot@example.com>"
            }"#,
        )
        .unwrap();
        let sender = Sender::from_config(&config).unwrap();
        assert_eq!(sender.port(), 465);
        let address = sender.address().unwrap();
        assert_eq!(address.name(), "Mail Bot");
        assert_eq!(address.addr(), "bot@example.com");
    }

    #[test]
    fn test_from_config_invalid_address() {
        let config = SenderConfig {
            host: "smtp.example.com".into(),
            username: "user".into(),
            password: "secret".into(),
            address: Some("not-an-address".into()),
            ..SenderConfig::default()
        };
        assert!(matches!(
            Sender::from_config(&config),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let sender = Sender::new("smtp.example.com", "user", "hunter2").unwrap();
        let debug = format!("{sender:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_registry() {
        let registry = SenderRegistry::new();
        assert!(registry.default_sender().is_none());

        let sender = Arc::new(Sender::new("smtp.example.com", "user", "pass").unwrap());
        registry.set_default(Arc::clone(&sender));
        assert!(Arc::ptr_eq(&registry.default_sender().unwrap(), &sender));

        registry.clear();
        assert!(registry.default_sender().is_none());
    }
}
