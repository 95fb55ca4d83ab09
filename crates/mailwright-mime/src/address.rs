//! Email address types and header encoding.

use crate::encoding::{is_printable_ascii, q_encode, quoted_string};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Last column an address may end on, leaving room for `<` and `>`.
const ADDR_MAX_COLUMN: usize = 74;

const FOLD: &[u8] = b"\r\n ";

/// A human-friendly email address: display name plus the actual address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    name: String,
    addr: String,
}

impl Address {
    /// Creates a new address with a display name (which may be empty).
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` fails [`seems_valid_addr`].
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if !seems_valid_addr(&addr) {
            return Err(Error::InvalidAddress(addr));
        }
        Ok(Self {
            name: name.into(),
            addr,
        })
    }

    /// Creates a new address without a display name.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` fails [`seems_valid_addr`].
    pub fn bare(addr: impl Into<String>) -> Result<Self> {
        Self::new(String::new(), addr)
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the email address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the domain part of the address (after the last `@`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.addr.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    /// Encodes the address for a header line, folding where needed.
    ///
    /// `offset` is the column the address starts on. Printable-ASCII names
    /// are written as quoted strings, anything else as Q-encoded words. A
    /// fold (CRLF + space) is inserted before `<addr>` when it would end past
    /// column 76. Returns the encoded bytes and the column after them.
    #[must_use]
    pub fn encode(&self, offset: usize) -> (Vec<u8>, usize) {
        let addr_len = self.addr.len();
        let mut column = offset;
        let mut dst;

        if self.name.is_empty() {
            dst = Vec::with_capacity(addr_len + 5);
        } else {
            if is_printable_ascii(self.name.as_bytes()) {
                dst = quoted_string(&self.name);
                column += dst.len() + 1;
            } else {
                let (word, end) = q_encode(self.name.as_bytes(), column);
                dst = word;
                column = end + 1;
            }
            dst.reserve(addr_len + 5);
            if column + addr_len <= ADDR_MAX_COLUMN {
                dst.push(b' ');
            }
        }

        if column + addr_len > ADDR_MAX_COLUMN {
            dst.extend_from_slice(FOLD);
            column = 1;
        }

        dst.push(b'<');
        dst.extend_from_slice(self.addr.as_bytes());
        dst.push(b'>');
        (dst, column + addr_len + 2)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.addr)
        } else {
            write!(f, "{} <{}>", String::from_utf8_lossy(&quoted_string(&self.name)), self.addr)
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parses `addr`, `<addr>` or `Display Name <addr>`.
    ///
    /// Surrounding double quotes are removed from the display name.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(open) = s.rfind('<') else {
            return Self::bare(s);
        };
        let addr = s[open + 1..]
            .strip_suffix('>')
            .ok_or_else(|| Error::InvalidMailbox(s.to_string()))?;
        let name = s[..open].trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name);
        Self::new(name, addr.trim())
    }
}

/// Encodes a list of addresses for a header line.
///
/// Items are separated by `", "`, or folded onto a continuation line when
/// the current line is already full. `offset` is the column the list starts
/// on, e.g. 4 after `"To: "`.
#[must_use]
pub fn encode_address_list(list: &[Address], offset: usize) -> Vec<u8> {
    let mut dst = Vec::with_capacity(list.len() * 64);
    let mut column = offset;

    for (i, item) in list.iter().enumerate() {
        if i > 0 {
            match column {
                0..75 => {
                    dst.extend_from_slice(b", ");
                    column += 2;
                }
                75 => {
                    dst.extend_from_slice(b",\r\n ");
                    column = 1;
                }
                _ => {
                    dst.extend_from_slice(b"\r\n , ");
                    column = 3;
                }
            }
        }
        let (encoded, end) = item.encode(column);
        dst.extend_from_slice(&encoded);
        column = end;
    }

    dst
}

/// Loosely checks that `addr` looks like an email address.
///
/// Only weeds out obviously invalid addresses: there must be exactly one
/// `@`, followed by a domain name with a top-level part. All characters
/// must be printable ASCII, and `[`, `]` and `\` are rejected in the domain.
#[must_use]
pub fn seems_valid_addr(addr: &str) -> bool {
    let mut seen_at = false;
    let mut seen_domain = false;
    let mut seen_dot = false;
    let mut seen_tld = false;

    for c in addr.chars() {
        match c {
            '@' => {
                if seen_at {
                    return false;
                }
                seen_at = true;
            }
            // A dot counts once it follows a domain label; each dot starts
            // a new last label.
            '.' => {
                if seen_at {
                    seen_dot |= seen_domain;
                    seen_tld = false;
                }
            }
            '!'..='~' => {
                if seen_at {
                    // RFC 5322 §3.4.1
                    if matches!(c, '[' | ']' | '\\') {
                        return false;
                    }
                    seen_domain = true;
                    seen_tld = seen_dot;
                }
            }
            _ => return false,
        }
    }
    seen_tld
}
