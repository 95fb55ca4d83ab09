//! The message data model and its builder operations.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use mailwright_mime::Address;
use serde::Serialize;

use crate::compose::Composer;
use crate::error::{ComposeError, ComposeErrors, TemplateError};
use crate::payload::{Attachment, Payload, Related};
use crate::sender::{Sender, SenderRegistry};
use crate::template::{Syntax, Template};

/// Content type of the plain-text body.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Content type of the HTML body.
pub const TEXT_HTML: &str = "text/html; charset=utf-8";

/// Content-Transfer-Encoding of a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cte {
    /// Let the composer decide (quoted-printable).
    #[default]
    Auto,
    /// Quoted-printable.
    QuotedPrintable,
    /// Base64.
    Base64,
}

#[derive(Debug, Clone)]
enum Content {
    Literal(Vec<u8>),
    Template { template: Template, rendered: Vec<u8> },
}

/// One alternative representation of the message body.
#[derive(Debug, Clone)]
pub struct Part {
    content_type: String,
    cte: Cte,
    content: Content,
    related: Vec<Related>,
}

impl Part {
    /// Creates a part with literal content.
    #[must_use]
    pub fn new(
        content_type: impl Into<String>,
        cte: Cte,
        body: impl Into<Vec<u8>>,
        related: Vec<Related>,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            cte,
            content: Content::Literal(body.into()),
            related,
        }
    }

    fn templated(content_type: &str, template: Template, related: Vec<Related>) -> Self {
        Self {
            content_type: content_type.to_string(),
            cte: Cte::QuotedPrintable,
            content: Content::Template {
                template,
                rendered: Vec::new(),
            },
            related,
        }
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the transfer encoding.
    #[must_use]
    pub const fn cte(&self) -> Cte {
        self.cte
    }

    /// Returns the body: the literal content, or the output of the last
    /// render for template parts.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        match &self.content {
            Content::Literal(bytes) => bytes,
            Content::Template { rendered, .. } => rendered,
        }
    }

    /// Returns the template of a template part.
    #[must_use]
    pub const fn template(&self) -> Option<&Template> {
        match &self.content {
            Content::Literal(_) => None,
            Content::Template { template, .. } => Some(template),
        }
    }

    /// Returns the related items sent alongside this part.
    #[must_use]
    pub fn related(&self) -> &[Related] {
        &self.related
    }

    fn has_file_payloads(&self) -> bool {
        self.related.iter().any(|r| r.payload().is_file())
    }
}

#[derive(Debug, Clone)]
enum Subject {
    Literal(String),
    Template { template: Template, rendered: String },
}

impl Default for Subject {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

/// An email message under construction.
///
/// Builder methods take `&mut self` and return it for chaining. A message
/// is composed into wire bytes by a [`Composer`]; composing only updates
/// rendered template output and cached file contents, so the same message
/// can be composed repeatedly with different data.
///
/// Cloning yields an independent copy. File-backed attachments and related
/// items are not copied; the clone reads them again when prepared.
#[derive(Debug)]
pub struct Message {
    domain: Option<String>,
    subject: Subject,
    sender: Option<Arc<Sender>>,
    from: Option<Address>,
    reply_to: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    parts: Vec<Part>,
    text: Option<usize>,
    html: Option<usize>,
    attachments: Vec<Attachment>,
    prepared: bool,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain: None,
            subject: Subject::default(),
            sender: None,
            from: None,
            reply_to: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            parts: Vec::new(),
            text: None,
            html: None,
            attachments: Vec::new(),
            prepared: true,
        }
    }

    /// Creates a message with a subject, an optional plain-text body and an
    /// optional HTML body.
    #[must_use]
    pub fn quick(subject: impl Into<String>, text: Option<&str>, html: Option<&str>) -> Self {
        let mut message = Self::new();
        message.subject(subject);
        if let Some(text) = text {
            message.text(text);
        }
        if let Some(html) = html {
            message.html(html, Vec::new());
        }
        message
    }

    /// Sets the domain of the generated Message-ID.
    ///
    /// Defaults to the domain of the From address.
    pub fn domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets a literal subject, replacing any subject template.
    pub fn subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = Subject::Literal(subject.into());
        self
    }

    /// Sets a subject template, rendered on every compose.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse; the message is left
    /// unchanged.
    pub fn subject_template(&mut self, source: &str) -> Result<&mut Self, TemplateError> {
        let template = Template::parse(source, Syntax::Text)?;
        self.subject = Subject::Template {
            template,
            rendered: String::new(),
        };
        Ok(self)
    }

    /// Sets the sender whose address is used when no From address is set.
    pub fn sender(&mut self, sender: Arc<Sender>) -> &mut Self {
        self.sender = Some(sender);
        self
    }

    /// Sets the From address.
    pub fn from(&mut self, addr: Address) -> &mut Self {
        self.from = Some(addr);
        self
    }

    /// Sets the Reply-To address.
    pub fn reply_to(&mut self, addr: Address) -> &mut Self {
        self.reply_to = Some(addr);
        self
    }

    /// Replaces the To recipients.
    pub fn to(&mut self, addrs: impl IntoIterator<Item = Address>) -> &mut Self {
        self.to = addrs.into_iter().collect();
        self
    }

    /// Replaces the Cc recipients.
    pub fn cc(&mut self, addrs: impl IntoIterator<Item = Address>) -> &mut Self {
        self.cc = addrs.into_iter().collect();
        self
    }

    /// Replaces the Bcc recipients.
    ///
    /// Bcc addresses receive the message but never appear in its headers.
    pub fn bcc(&mut self, addrs: impl IntoIterator<Item = Address>) -> &mut Self {
        self.bcc = addrs.into_iter().collect();
        self
    }

    /// Adds an alternative body part.
    ///
    /// Use [`text`](Self::text) and [`html`](Self::html) for the usual
    /// plain-text and HTML bodies.
    pub fn part(
        &mut self,
        content_type: impl Into<String>,
        cte: Cte,
        body: impl Into<Vec<u8>>,
        related: Vec<Related>,
    ) -> &mut Self {
        let part = Part::new(content_type, cte, body, related);
        if part.has_file_payloads() {
            self.prepared = false;
        }
        self.parts.push(part);
        self
    }

    /// Sets the plain-text body, replacing a previous one in place.
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        let text: String = text.into();
        let part = Part::new(TEXT_PLAIN, Cte::QuotedPrintable, text, Vec::new());
        self.text = Some(self.put_part(self.text, part));
        self
    }

    /// Sets the plain-text body to a template, replacing a previous one in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse; the message is left
    /// unchanged.
    pub fn text_template(&mut self, source: &str) -> Result<&mut Self, TemplateError> {
        let template = Template::parse(source, Syntax::Text)?;
        let part = Part::templated(TEXT_PLAIN, template, Vec::new());
        self.text = Some(self.put_part(self.text, part));
        Ok(self)
    }

    /// Sets the HTML body with its related items, replacing a previous one
    /// in place.
    pub fn html(&mut self, html: impl Into<String>, related: Vec<Related>) -> &mut Self {
        let html: String = html.into();
        let part = Part::new(TEXT_HTML, Cte::QuotedPrintable, html, related);
        self.html = Some(self.put_part(self.html, part));
        self
    }

    /// Sets the HTML body to a template, replacing a previous one in place.
    ///
    /// Values inserted by the template are HTML-escaped.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse; the message is left
    /// unchanged.
    pub fn html_template(
        &mut self,
        source: &str,
        related: Vec<Related>,
    ) -> Result<&mut Self, TemplateError> {
        let template = Template::parse(source, Syntax::Html)?;
        let part = Part::templated(TEXT_HTML, template, related);
        self.html = Some(self.put_part(self.html, part));
        Ok(self)
    }

    /// Attaches files by path, naming each after its file and guessing its
    /// type from the extension.
    pub fn attach<P: Into<PathBuf>>(&mut self, paths: impl IntoIterator<Item = P>) -> &mut Self {
        for path in paths {
            self.attachments.push(Attachment::file(path));
            self.prepared = false;
        }
        self
    }

    /// Attaches a file under the given name and type.
    pub fn attach_file(
        &mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> &mut Self {
        self.attachments
            .push(Attachment::named_file(name, content_type, path));
        self.prepared = false;
        self
    }

    /// Attaches bytes from memory.
    pub fn attach_object(
        &mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> &mut Self {
        self.attachments
            .push(Attachment::object(name, content_type, data));
        self
    }

    /// Reads every file-backed attachment and related item that has not
    /// been read yet.
    ///
    /// Does nothing if the message is already prepared.
    ///
    /// # Errors
    ///
    /// Returns one [`ComposeError::Payload`] per unreadable file. The
    /// message stays unprepared until all files have been read.
    pub fn prepare(&mut self) -> Result<(), ComposeErrors> {
        self.load_payloads(false)
    }

    /// Reads every file-backed attachment and related item again, even if
    /// already read.
    ///
    /// # Errors
    ///
    /// Returns one [`ComposeError::Payload`] per unreadable file.
    pub fn prepare_fresh(&mut self) -> Result<(), ComposeErrors> {
        self.load_payloads(true)
    }

    /// Drops cached file contents so the next prepare or compose reads
    /// every file again.
    pub fn invalidate(&mut self) {
        for payload in self.payloads_mut() {
            if let Payload::File { cache, .. } = payload {
                *cache = None;
            }
        }
        self.prepared = !self.has_file_payloads();
    }

    /// Returns true if every file-backed payload has been read.
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Composes the message with the default [`Composer`].
    ///
    /// # Errors
    ///
    /// See [`Composer::compose`].
    pub fn compose<T: Serialize>(&mut self, data: &T) -> Result<Vec<u8>, ComposeErrors> {
        Composer::default().compose(self, data)
    }

    /// Returns the address the message would be sent from: the From
    /// address, else the sender's address, else the default sender's.
    #[must_use]
    pub fn from_addr(&self, registry: Option<&SenderRegistry>) -> Option<String> {
        self.resolve_from(registry).map(|a| a.addr().to_string())
    }

    /// Returns every envelope recipient without duplicates: To (or the
    /// From address when To is empty), then Cc, then Bcc.
    #[must_use]
    pub fn recipient_addrs(&self, registry: Option<&SenderRegistry>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::with_capacity(self.to.len() + self.cc.len() + self.bcc.len() + 1);

        if self.to.is_empty()
            && let Some(from) = self.from_addr(registry)
        {
            seen.insert(from.clone());
            recipients.push(from);
        }
        for addr in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if seen.insert(addr.addr().to_string()) {
                recipients.push(addr.addr().to_string());
            }
        }
        recipients
    }

    /// Returns the Message-ID domain override.
    #[must_use]
    pub fn domain_override(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Returns the subject: the literal text, or the output of the last
    /// render when a template is set.
    #[must_use]
    pub fn subject_text(&self) -> &str {
        match &self.subject {
            Subject::Literal(text) => text,
            Subject::Template { rendered, .. } => rendered,
        }
    }

    /// Returns the explicit From address.
    #[must_use]
    pub const fn from_address(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    /// Returns the Reply-To address.
    #[must_use]
    pub const fn reply_to_address(&self) -> Option<&Address> {
        self.reply_to.as_ref()
    }

    /// Returns the To recipients.
    #[must_use]
    pub fn to_addresses(&self) -> &[Address] {
        &self.to
    }

    /// Returns the Cc recipients.
    #[must_use]
    pub fn cc_addresses(&self) -> &[Address] {
        &self.cc
    }

    /// Returns the Bcc recipients.
    #[must_use]
    pub fn bcc_addresses(&self) -> &[Address] {
        &self.bcc
    }

    /// Returns the body parts in order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns the plain-text part.
    #[must_use]
    pub fn text_part(&self) -> Option<&Part> {
        self.text.and_then(|i| self.parts.get(i))
    }

    /// Returns the HTML part.
    #[must_use]
    pub fn html_part(&self) -> Option<&Part> {
        self.html.and_then(|i| self.parts.get(i))
    }

    /// Returns the attachments in order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub(crate) fn resolve_from(&self, registry: Option<&SenderRegistry>) -> Option<Address> {
        if let Some(from) = &self.from {
            return Some(from.clone());
        }
        if let Some(addr) = self.sender.as_ref().and_then(|s| s.address()) {
            return Some(addr.clone());
        }
        registry
            .and_then(SenderRegistry::default_sender)
            .and_then(|s| s.address().cloned())
    }

    /// Renders the subject and part templates, collecting failures.
    pub(crate) fn render_templates<T: Serialize>(&mut self, data: &T, errors: &mut ComposeErrors) {
        if let Subject::Template { template, rendered } = &mut self.subject {
            match template.render(data) {
                Ok(text) => *rendered = text,
                Err(e) => errors.push(ComposeError::SubjectTemplate(e)),
            }
        }
        for (index, part) in self.parts.iter_mut().enumerate() {
            if let Content::Template { template, rendered } = &mut part.content {
                match template.render(data) {
                    Ok(text) => *rendered = text.into_bytes(),
                    Err(source) => errors.push(ComposeError::PartTemplate { index, source }),
                }
            }
        }
    }

    fn put_part(&mut self, slot: Option<usize>, part: Part) -> usize {
        if part.has_file_payloads() {
            self.prepared = false;
        }
        if let Some(index) = slot {
            self.parts[index] = part;
            index
        } else {
            self.parts.push(part);
            self.parts.len() - 1
        }
    }

    fn load_payloads(&mut self, force: bool) -> Result<(), ComposeErrors> {
        if self.prepared && !force {
            return Ok(());
        }
        let mut errors = ComposeErrors::new();
        for payload in self.payloads_mut() {
            if let Err(e) = payload.load(force) {
                errors.push(e);
            }
        }
        self.prepared = errors.is_empty();
        errors.into_result()
    }

    fn payloads_mut(&mut self) -> impl Iterator<Item = &mut Payload> {
        self.parts
            .iter_mut()
            .flat_map(|p| p.related.iter_mut().map(Related::payload_mut))
            .chain(self.attachments.iter_mut().map(Attachment::payload_mut))
    }

    fn has_file_payloads(&self) -> bool {
        self.parts.iter().any(Part::has_file_payloads)
            || self.attachments.iter().any(|a| a.payload().is_file())
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        let mut message = Self {
            domain: self.domain.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            from: self.from.clone(),
            reply_to: self.reply_to.clone(),
            to: self.to.clone(),
            cc: self.cc.clone(),
            bcc: self.bcc.clone(),
            parts: self.parts.clone(),
            text: self.text,
            html: self.html,
            attachments: self.attachments.clone(),
            prepared: true,
        };
        // Payload clones drop file contents.
        message.prepared = !message.has_file_payloads();
        message
    }
}
