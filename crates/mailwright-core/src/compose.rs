//! Message composition: renders a [`Message`] into MIME wire format.
//!
//! The output layout is:
//!
//! ```text
//! headers
//! multipart/mixed                  (only with attachments)
//!   multipart/alternative          (with an HTML part or several parts)
//!     text/plain                   (synthesized from HTML if missing)
//!     multipart/related            (for each part with related items)
//!       part
//!       related item...
//!   attachment...
//! ```
//!
//! The Message-ID and every boundary share one token derived from the
//! timestamp and subject, so output is deterministic for a fixed clock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailwright_mime::encoding::{
    base64_encode, is_printable_ascii, q_encode, q_encode_if_needed, quoted_printable_encode,
    quoted_string,
};
use mailwright_mime::{Address, encode_address_list, html_to_text};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{ComposeError, ComposeErrors};
use crate::message::{Cte, Message, Part, TEXT_PLAIN};
use crate::sender::SenderRegistry;

/// Length of the token used in Message-ID and boundaries.
pub const TOKEN_LEN: usize = 43;

/// Source of the current time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at a fixed time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of the token used in Message-ID and boundaries.
pub trait IdSource: fmt::Debug + Send + Sync {
    /// Returns a token for a message with the given `Date` header value and
    /// subject.
    ///
    /// The token is used verbatim inside quoted boundary parameters and the
    /// Message-ID, so it must consist of printable ASCII without `"`, `\`,
    /// `<`, `>` or `@`.
    fn token(&self, timestamp: &str, subject: &[u8]) -> String;
}

/// Derives the token from a SHA-256 hash of the timestamp and subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedId;

impl IdSource for HashedId {
    fn token(&self, timestamp: &str, subject: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.as_bytes());
        hasher.update(subject);
        let encoded = base64_encode(&hasher.finalize());
        // 32 bytes encode to 44 characters; the last one is padding.
        String::from_utf8_lossy(&encoded[..TOKEN_LEN]).into_owned()
    }
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct FixedId(pub String);

impl IdSource for FixedId {
    fn token(&self, _timestamp: &str, _subject: &[u8]) -> String {
        self.0.clone()
    }
}

/// Composes messages into MIME wire format.
///
/// Holds the clock and token source, and optionally a [`SenderRegistry`]
/// whose default sender supplies the From address of messages that have
/// none.
#[derive(Debug, Clone)]
pub struct Composer {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    registry: Option<Arc<SenderRegistry>>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    /// Creates a composer using the system clock and hashed tokens.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(HashedId),
            registry: None,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the token source.
    #[must_use]
    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Uses the default sender of `registry` as the last From fallback.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SenderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Returns the sender registry, if any.
    #[must_use]
    pub fn registry(&self) -> Option<&SenderRegistry> {
        self.registry.as_deref()
    }

    /// Renders `message` with `data` into a complete MIME message.
    ///
    /// Templates are rendered with `data` as context and unread files are
    /// read. Rendered output and file contents are kept in the message.
    ///
    /// # Errors
    ///
    /// Returns every problem found: a missing From address (reported
    /// alone), template render failures, a message without parts and
    /// unreadable files. No output is produced in that case.
    pub fn compose<T: Serialize>(
        &self,
        message: &mut Message,
        data: &T,
    ) -> Result<Vec<u8>, ComposeErrors> {
        let Some(from) = message.resolve_from(self.registry()) else {
            warn!("Cannot compose message without a From address");
            return Err(ComposeError::NoFromAddress.into());
        };

        let mut errors = ComposeErrors::new();
        message.render_templates(data, &mut errors);
        if message.parts().is_empty() {
            errors.push(ComposeError::NoParts);
        }
        if let Err(e) = message.prepare() {
            errors.extend(e);
        }
        if let Err(errors) = errors.into_result() {
            for error in &errors {
                warn!("Compose failed: {error}");
            }
            return Err(errors);
        }

        let domain = message
            .domain_override()
            .unwrap_or_else(|| from.domain())
            .to_string();
        let timestamp = self
            .clock
            .now()
            .format("%a, %d %b %Y %H:%M:%S %z")
            .to_string();
        let token = self
            .ids
            .token(&timestamp, message.subject_text().as_bytes());

        debug!(
            parts = message.parts().len(),
            attachments = message.attachments().len(),
            "Composing message"
        );

        let mut writer = Writer::new(&token);
        writer.headers(message, &from, &domain, &timestamp);
        writer.body(message);

        debug!(bytes = writer.out.len(), "Composed message");
        Ok(writer.out)
    }
}

/// Quoted `filename` parameter value. Names that are not printable ASCII
/// are Q-encoded inside the quotes.
fn filename(name: &str) -> Vec<u8> {
    if is_printable_ascii(name.as_bytes()) {
        return quoted_string(name);
    }
    // `\tfilename="` ends on column 11.
    let (word, _) = q_encode(name.as_bytes(), 11);
    quoted_string(&String::from_utf8_lossy(&word))
}

struct Writer<'a> {
    out: Vec<u8>,
    token: &'a str,
}

impl<'a> Writer<'a> {
    fn new(token: &'a str) -> Self {
        Self {
            out: Vec::with_capacity(4096),
            token,
        }
    }

    fn put(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.out.extend_from_slice(bytes.as_ref());
        self
    }

    fn headers(&mut self, message: &Message, from: &Address, domain: &str, timestamp: &str) {
        let token = self.token;
        self.put("Message-ID: <").put(token).put("@").put(domain).put(">\r\n");
        self.put("Date: ").put(timestamp).put("\r\n");
        self.put("Subject: ")
            .put(q_encode_if_needed(message.subject_text().as_bytes(), 9))
            .put("\r\n");
        self.put("From: ").put(from.encode(6).0).put("\r\n");
        if let Some(reply_to) = message.reply_to_address()
            && reply_to.addr() != from.addr()
        {
            self.put("Reply-To: ").put(reply_to.encode(10).0).put("\r\n");
        }

        let to = message.to_addresses();
        let to = if to.is_empty() {
            encode_address_list(std::slice::from_ref(from), 4)
        } else {
            encode_address_list(to, 4)
        };
        self.put("To: ").put(to).put("\r\n");

        let cc = message.cc_addresses();
        if !cc.is_empty() {
            self.put("Cc: ").put(encode_address_list(cc, 4)).put("\r\n");
        }

        self.put("MIME-Version: 1.0\r\n");
    }

    fn body(&mut self, message: &Message) {
        debug_assert!(message.is_prepared(), "composing with unread file payloads");
        let mixed = !message.attachments().is_empty();
        let alternative = message.html_part().is_some() || message.parts().len() > 1;

        if mixed {
            self.multipart_header("mixed", "=_m", "");
            self.delimiter("=_m", "");
        }
        if alternative {
            self.multipart_header("alternative", "=_a", "");
        }

        if let Some(html) = message.html_part()
            && message.text_part().is_none()
        {
            let text = html_to_text(&String::from_utf8_lossy(html.body()));
            self.delimiter("=_a", "");
            self.leaf(TEXT_PLAIN, "quoted-printable", &quoted_printable_encode(text.as_bytes()));
        }

        for (index, part) in message.parts().iter().enumerate() {
            if alternative {
                self.delimiter("=_a", "");
            }
            self.part(index, part);
        }

        if alternative {
            self.close("=_a", "");
        }

        for attachment in message.attachments() {
            let data = attachment.payload().data().unwrap_or_default();
            self.delimiter("=_m", "");
            self.put("Content-Type: ")
                .put(attachment.content_type())
                .put("\r\nContent-Disposition: attachment;\r\n\tfilename=")
                .put(filename(attachment.name()))
                .put("\r\nContent-Transfer-Encoding: base64\r\n\r\n")
                .put(base64_encode(data))
                .put("\r\n");
        }

        if mixed {
            self.close("=_m", "");
        }
    }

    fn part(&mut self, index: usize, part: &Part) {
        let related = part.related();
        let index = index.to_string();
        if !related.is_empty() {
            self.multipart_header("related", "=_r", &index);
            self.delimiter("=_r", &index);
        }

        match part.cte() {
            Cte::Base64 => {
                self.leaf(part.content_type(), "base64", &base64_encode(part.body()));
            }
            Cte::Auto | Cte::QuotedPrintable => {
                self.leaf(
                    part.content_type(),
                    "quoted-printable",
                    &quoted_printable_encode(part.body()),
                );
            }
        }

        for item in related {
            let data = item.payload().data().unwrap_or_default();
            self.delimiter("=_r", &index);
            self.put("Content-Type: ")
                .put(item.content_type())
                .put("\r\nContent-ID: <")
                .put(item.id())
                .put(">\r\nContent-Transfer-Encoding: base64\r\n\r\n")
                .put(base64_encode(data))
                .put("\r\n");
        }

        if !related.is_empty() {
            self.close("=_r", &index);
        }
    }

    /// `Content-Type: multipart/<kind>` with its boundary parameter. The
    /// first delimiter supplies the blank line ending the headers.
    fn multipart_header(&mut self, kind: &str, prefix: &str, infix: &str) {
        let token = self.token;
        self.put("Content-Type: multipart/")
            .put(kind)
            .put(";\r\n\tboundary=\"")
            .put(prefix)
            .put(infix)
            .put(token)
            .put("\"\r\n");
    }

    fn leaf(&mut self, content_type: &str, cte: &str, encoded: &[u8]) {
        self.put("Content-Type: ")
            .put(content_type)
            .put("\r\nContent-Transfer-Encoding: ")
            .put(cte)
            .put("\r\n\r\n")
            .put(encoded)
            .put("\r\n");
    }

    fn delimiter(&mut self, prefix: &str, infix: &str) {
        let token = self.token;
        self.put("\r\n--").put(prefix).put(infix).put(token).put("\r\n");
    }

    fn close(&mut self, prefix: &str, infix: &str) {
        let token = self.token;
        self.put("\r\n--").put(prefix).put(infix).put(token).put("--\r\n");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> Composer {
        Composer::new()
            .with_clock(FixedClock(Utc.with_ymd_and_hms(2013, 8, 30, 9, 10, 11).unwrap()))
            .with_id_source(FixedId("TOKEN".into()))
    }

    fn text_message() -> Message {
        let mut message = Message::new();
        message
            .subject("Hello")
            .from(Address::bare("me@example.com").unwrap())
            .text("Hi");
        message
    }

    #[test]
    fn test_hashed_id_is_deterministic() {
        let a = HashedId.token("Fri, 30 Aug 2013 09:10:11 +0000", b"Test #1");
        let b = HashedId.token("Fri, 30 Aug 2013 09:10:11 +0000", b"Test #1");
        let c = HashedId.token("Fri, 30 Aug 2013 09:10:12 +0000", b"Test #1");
        assert_eq!(a.len(), TOKEN_LEN);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.contains('='));
    }

    #[test]
    fn test_single_part_has_no_multipart() {
        let out = fixed().compose(&mut text_message(), &()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Message-ID: <TOKEN@example.com>\r\n"));
        assert!(out.contains("Date: Fri, 30 Aug 2013 09:10:11 +0000\r\n"));
        assert!(out.ends_with(
            "MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: quoted-printable\r\n\r\n\
             Hi\r\n"
        ));
        assert!(!out.contains("multipart"));
    }

    #[test]
    fn test_domain_override() {
        let mut message = text_message();
        message.domain("mail.example.org");
        let out = fixed().compose(&mut message, &()).unwrap();
        assert!(out.starts_with(b"Message-ID: <TOKEN@mail.example.org>\r\n"));
    }

    #[test]
    fn test_reply_to_only_when_different() {
        let mut message = text_message();
        message.reply_to(Address::new("Me", "me@example.com").unwrap());
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(!out.contains("Reply-To:"));

        message.reply_to(Address::bare("replies@example.com").unwrap());
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(out.contains("Reply-To: <replies@example.com>\r\nTo: <me@example.com>\r\n"));
    }

    #[test]
    fn test_bcc_and_cc_headers() {
        let mut message = text_message();
        message
            .cc([Address::bare("cc@example.com").unwrap()])
            .bcc([Address::bare("hidden@example.com").unwrap()]);
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(out.contains("Cc: <cc@example.com>\r\n"));
        assert!(!out.contains("hidden@example.com"));
        assert!(!out.contains("Bcc"));
    }

    #[test]
    fn test_base64_part() {
        let mut message = Message::new();
        message
            .from(Address::bare("me@example.com").unwrap())
            .part("application/octet-stream", Cte::Base64, vec![0u8, 1, 2], Vec::new());
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(out.ends_with(
            "Content-Type: application/octet-stream\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n\
             AAEC\r\n"
        ));
    }

    #[test]
    fn test_missing_from_reported_alone() {
        let mut message = Message::new();
        let errors = fixed().compose(&mut message, &()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.iter().next(), Some(ComposeError::NoFromAddress)));
    }

    #[test]
    fn test_attachment_filename_encoding() {
        let mut message = text_message();
        message
            .attach_object("résumé.pdf", "application/pdf", "pdf")
            .attach_object(r#"say "hi".txt"#, "text/plain", "hi");
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(out.contains("\tfilename=\"=?utf-8?q?r=C3=A9sum=C3=A9.pdf?=\"\r\n"));
        assert!(out.contains("\tfilename=\"say \\\"hi\\\".txt\"\r\n"));
        assert!(out.is_ascii());
    }

    #[test]
    fn test_composed_file_payloads_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "abc").unwrap();

        let mut message = text_message();
        message.attach([&path]);
        assert!(!message.is_prepared());
        let out = String::from_utf8(fixed().compose(&mut message, &()).unwrap()).unwrap();
        assert!(message.is_prepared());
        assert_eq!(message.attachments()[0].payload().data(), Some(&b"abc"[..]));
        assert!(out.contains("Content-Transfer-Encoding: base64\r\n\r\nYWJj\r\n"));
    }
}
