//! Namespace templates
//!
//! A template is evaluated against every record to pick its namespace. The
//! evaluation capability sits behind [`TemplateEngine`] so callers can plug in
//! their own engine; [`PlaceholderTemplate`] is the built-in one.
//!
//! ## Supported expressions
//!
//! | Expression | Value |
//! |------------|-------|
//! | `{{ .Operation }}` | `create`, `update`, `delete` or `snapshot` |
//! | `{{ .Key }}` | record key as a string |
//! | `{{ .Metadata.<key> }}` | metadata value; the key may contain dots |
//! | `{{ index .Metadata "<key>" }}` | metadata value, quoted key; empty when missing |
//! | `{{ .Payload.After.<field> }}` | top-level field of the JSON `after` image |
//!
//! ## Example
//!
//! ```rust
//! use rivven_pinecone::record::Record;
//! use rivven_pinecone::template::{PlaceholderTemplate, TemplateEngine};
//!
//! let template = PlaceholderTemplate::parse("tenant-{{ .Metadata.tenant }}").unwrap();
//! let record = Record::delete("k1").with_metadata("tenant", "acme");
//!
//! assert_eq!(template.render(&record).unwrap(), "tenant-acme");
//! ```

use crate::record::Record;
use std::fmt;
use std::sync::LazyLock;

/// Pre-compiled regex matching one `{{ ... }}` action.
static ACTION_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\{\{\s*(.*?)\s*\}\}")
        .expect("action regex pattern is invalid - this is a bug")
});

/// Pre-compiled regex for the `index .Metadata "key"` form.
static INDEX_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"^index\s+\.Metadata\s+"([^"]*)"$"#)
        .expect("index regex pattern is invalid - this is a bug")
});

/// Whether a configured namespace should be treated as a template.
pub fn is_template(s: &str) -> bool {
    s.contains("{{") && s.contains("}}")
}

/// Failure to parse or evaluate a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TemplateError(pub String);

impl TemplateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Capability that turns a record into a namespace string.
///
/// Implementations must be pure: no I/O and no shared mutable state.
pub trait TemplateEngine: fmt::Debug + Send + Sync {
    /// Evaluate the template against one record.
    fn render(&self, record: &Record) -> Result<String, TemplateError>;
}

/// Field a placeholder reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Operation,
    Key,
    /// `.Metadata.k`: a missing key is an error.
    Metadata(String),
    /// `index .Metadata "k"`: a missing key renders as the empty string.
    MetadataIndex(String),
    PayloadAfter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Built-in template engine with `{{ .Field }}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PlaceholderTemplate {
    /// Parse a template source.
    ///
    /// Fails on unclosed or stray delimiters and on unknown expressions, so
    /// that a bad template is rejected at configuration time rather than per
    /// record.
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();

        let mut segments = Vec::new();
        let mut cursor = 0;
        for cap in ACTION_REGEX.captures_iter(&source) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(Self::literal(&source, &source[cursor..whole.start()])?);
            }
            segments.push(Segment::Field(Self::parse_action(&cap[1])?));
            cursor = whole.end();
        }
        if cursor < source.len() {
            segments.push(Self::literal(&source, &source[cursor..])?);
        }

        Ok(Self { source, segments })
    }

    /// Text between actions must not contain a delimiter of its own.
    fn literal(source: &str, text: &str) -> Result<Segment, TemplateError> {
        if text.contains("{{") || text.contains("}}") {
            return Err(TemplateError::new(format!(
                "template '{}' contains an unclosed or stray delimiter",
                source
            )));
        }
        Ok(Segment::Literal(text.to_string()))
    }

    fn parse_action(action: &str) -> Result<Field, TemplateError> {
        if let Some(cap) = INDEX_REGEX.captures(action) {
            return Ok(Field::MetadataIndex(cap[1].to_string()));
        }
        match action {
            ".Operation" => Ok(Field::Operation),
            ".Key" => Ok(Field::Key),
            _ => {
                if let Some(key) = action.strip_prefix(".Metadata.") {
                    if !key.is_empty() {
                        return Ok(Field::Metadata(key.to_string()));
                    }
                }
                if let Some(field) = action.strip_prefix(".Payload.After.") {
                    if !field.is_empty() {
                        return Ok(Field::PayloadAfter(field.to_string()));
                    }
                }
                Err(TemplateError::new(format!(
                    "unsupported template expression '{{{{ {} }}}}'",
                    action
                )))
            }
        }
    }

    /// The template source as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn field_value(field: &Field, record: &Record) -> Result<String, TemplateError> {
        match field {
            Field::Operation => Ok(record.operation.to_string()),
            Field::Key => Ok(record.id()),
            Field::Metadata(key) => record
                .metadata
                .get(key)
                .cloned()
                .ok_or_else(|| TemplateError::new(format!("metadata key '{}' not found", key))),
            Field::MetadataIndex(key) => Ok(record.metadata.get(key).cloned().unwrap_or_default()),
            Field::PayloadAfter(name) => {
                let after = record
                    .payload
                    .after
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| {
                        TemplateError::new(format!(
                            "payload field '{}' requested but payload is empty",
                            name
                        ))
                    })?;
                let doc: serde_json::Value = serde_json::from_slice(after)
                    .map_err(|e| TemplateError::new(format!("payload is not JSON: {}", e)))?;
                match doc.get(name) {
                    Some(serde_json::Value::String(s)) => Ok(s.clone()),
                    Some(serde_json::Value::Null) | None => Err(TemplateError::new(format!(
                        "payload field '{}' not found",
                        name
                    ))),
                    Some(other) => Ok(other.to_string()),
                }
            }
        }
    }
}

impl TemplateEngine for PlaceholderTemplate {
    fn render(&self, record: &Record) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(field) => out.push_str(&Self::field_value(field, record)?),
            }
        }
        Ok(out)
    }
}
