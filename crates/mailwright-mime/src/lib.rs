//! # mailwright-mime
//!
//! Low-level building blocks for composing MIME email messages.
//!
//! ## Features
//!
//! - **Body encodings**: Quoted-Printable and Base64 wrapped at 76 columns,
//!   never splitting a UTF-8 sequence across a soft line break
//! - **Header words**: RFC 2047 Q-encoding that tracks the current column
//!   and folds long words onto continuation lines
//! - **Addresses**: loose validity check, quoted or Q-encoded display names
//!   and folded address lists
//! - **HTML to text**: plain-text rendering of HTML bodies
//!
//! ## Quick Start
//!
//! ```
//! use mailwright_mime::{Address, encode_address_list};
//! use mailwright_mime::encoding::{q_encode_if_needed, quoted_printable_encode};
//!
//! let to = Address::new("Jane Doe", "jane@example.com")?;
//! assert_eq!(encode_address_list(&[to], 4), b"\"Jane Doe\" <jane@example.com>");
//!
//! assert_eq!(&*q_encode_if_needed(b"Hello", 9), b"Hello");
//! assert_eq!(quoted_printable_encode(b"a=b"), b"a=3Db");
//! # Ok::<(), mailwright_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod error;

pub mod encoding;
pub mod html;

pub use address::{Address, encode_address_list, seems_valid_addr};
pub use error::{Error, Result};
pub use html::html_to_text;
