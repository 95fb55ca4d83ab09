//! Subject and body templates.
//!
//! Templates use handlebars syntax. Plain-text templates render values
//! verbatim; HTML templates escape them.

use std::sync::LazyLock;

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::TemplateError;

static TEXT_REGISTRY: LazyLock<Handlebars<'static>> = LazyLock::new(|| {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
});

static HTML_REGISTRY: LazyLock<Handlebars<'static>> = LazyLock::new(Handlebars::new);

/// How rendered values are written into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Values are inserted as-is.
    Text,
    /// Values are HTML-escaped.
    Html,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    syntax: Syntax,
}

impl Template {
    /// Parses `source`, checking it for syntax errors.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] if the source is not a valid template.
    pub fn parse(source: impl Into<String>, syntax: Syntax) -> Result<Self, TemplateError> {
        let source = source.into();
        handlebars::Template::compile(&source)
            .map_err(|e| TemplateError::Parse(e.to_string()))?;
        Ok(Self { source, syntax })
    }

    /// Returns the template source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the escaping mode.
    #[must_use]
    pub const fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Renders the template with `data` as context.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Render`] if rendering fails, for example when
    /// `data` cannot be serialized or a helper is missing.
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String, TemplateError> {
        let registry = match self.syntax {
            Syntax::Text => &*TEXT_REGISTRY,
            Syntax::Html => &*HTML_REGISTRY,
        };
        registry
            .render_template(&self.source, data)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_does_not_escape() {
        let tpl = Template::parse("Hello {{name}}!", Syntax::Text).unwrap();
        let out = tpl.render(&json!({"name": "<Tom & Jerry>"})).unwrap();
        assert_eq!(out, "Hello <Tom & Jerry>!");
    }

    #[test]
    fn test_html_escapes() {
        let tpl = Template::parse("<p>{{name}}</p>", Syntax::Html).unwrap();
        let out = tpl.render(&json!({"name": "<Tom & Jerry>"})).unwrap();
        assert_eq!(out, "<p>&lt;Tom &amp; Jerry&gt;</p>");
    }

    #[test]
    fn test_parse_error() {
        let err = Template::parse("{{#if x}}unclosed", Syntax::Text).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));
    }

    #[test]
    fn test_render_error() {
        let tpl = Template::parse("{{nosuchhelper x}}", Syntax::Text).unwrap();
        let err = tpl.render(&json!({"x": 1})).unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }

    #[test]
    fn test_render_struct() {
        #[derive(Serialize)]
        struct Order {
            id: u32,
            items: Vec<&'static str>,
        }
        let tpl = Template::parse("#{{id}}:{{#each items}} {{this}}{{/each}}", Syntax::Text).unwrap();
        let out = tpl.render(&Order { id: 7, items: vec!["a", "b"] }).unwrap();
        assert_eq!(out, "#7: a b");
    }
}
