//! # mailwright-core
//!
//! Email composition for `mailwright`.
//!
//! This crate provides:
//! - **Message model** - subject, addresses, text/HTML bodies, inline
//!   related objects and attachments
//! - **Templates** - handlebars subject and body templates rendered with
//!   any serializable data
//! - **Composer** - MIME wire format with deterministic Message-ID and
//!   boundaries for a given clock
//! - **Senders** - SMTP sender configuration and a default sender registry
//! - **Transport seam** - hand composed messages to any delivery mechanism
//!
//! ## Example
//!
//! ```
//! use mailwright_core::{Address, Composer, Message};
//! use serde_json::json;
//!
//! let mut message = Message::new();
//! message
//!     .from(Address::new("Shop", "shop@example.com")?)
//!     .to([Address::bare("jane@example.com")?])
//!     .subject_template("Order {{id}} shipped")?
//!     .text_template("Hi {{name}}, your order is on its way.")?;
//!
//! let bytes = Composer::new()
//!     .compose(&mut message, &json!({"id": 42, "name": "Jane"}))?;
//! assert!(bytes.starts_with(b"Message-ID: <"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod compose;
mod error;
pub mod message;
pub mod payload;
pub mod sender;
mod shared;
pub mod template;
pub mod transport;

pub use compose::{Clock, Composer, FixedClock, FixedId, HashedId, IdSource, SystemClock};
pub use error::{ComposeError, ComposeErrors, ConfigError, SendError, TemplateError};
pub use mailwright_mime::Address;
pub use message::{Cte, Message, Part};
pub use payload::{Attachment, Payload, Related};
pub use sender::{Sender, SenderConfig, SenderRegistry};
pub use shared::SharedMessage;
pub use template::{Syntax, Template};
pub use transport::{Envelope, Transport, TransportError};
