//! Namespace resolution
//!
//! Every record is routed to exactly one namespace of the index. The mode is
//! fixed at configuration time from the `namespace` setting:
//!
//! | Setting | Mode | Behavior |
//! |---------|------|----------|
//! | unset / `""` | per-record | read [`METADATA_COLLECTION_KEY`]; absent means the default namespace |
//! | contains `{{` and `}}` | templated | evaluate the template; failure aborts the write |
//! | anything else | static | same namespace for every record |

use crate::error::{PineconeSinkError, Result};
use crate::record::{Record, METADATA_COLLECTION_KEY};
use crate::template::{is_template, PlaceholderTemplate, TemplateEngine, TemplateError};
use std::fmt;
use std::sync::Arc;

/// A Pinecone namespace. `Namespace::default()` is the default (empty)
/// namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(ns: impl Into<String>) -> Self {
        Self(ns.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Decides which namespace a record belongs to.
#[derive(Debug, Clone, Default)]
pub enum NamespaceResolver {
    /// Fixed namespace for every record.
    Static(Namespace),
    /// Template evaluated per record.
    Template(Arc<dyn TemplateEngine>),
    /// Namespace read from record metadata.
    #[default]
    PerRecord,
}

impl NamespaceResolver {
    /// Select the resolution mode from the configured `namespace` value.
    pub fn from_config(namespace: Option<&str>) -> Result<Self> {
        match namespace {
            None | Some("") => Ok(Self::PerRecord),
            Some(s) if is_template(s) => {
                let template = PlaceholderTemplate::parse(s).map_err(|e| {
                    PineconeSinkError::config(format!(
                        "failed to parse namespace template {}: {}",
                        s, e
                    ))
                })?;
                Ok(Self::Template(Arc::new(template)))
            }
            Some(s) => Ok(Self::Static(Namespace::new(s))),
        }
    }

    /// Use a custom template engine.
    pub fn with_engine(engine: impl TemplateEngine + 'static) -> Self {
        Self::Template(Arc::new(engine))
    }

    /// Resolve the namespace for one record.
    pub fn resolve(&self, record: &Record) -> std::result::Result<Namespace, TemplateError> {
        match self {
            Self::Static(ns) => Ok(ns.clone()),
            Self::Template(engine) => engine.render(record).map(Namespace::from),
            Self::PerRecord => Ok(record
                .metadata
                .get(METADATA_COLLECTION_KEY)
                .map(|s| Namespace::new(s.as_str()))
                .unwrap_or_default()),
        }
    }

    /// The fixed namespace, when in static mode.
    pub fn static_namespace(&self) -> Option<&Namespace> {
        match self {
            Self::Static(ns) => Some(ns),
            _ => None,
        }
    }

    /// Short mode name for logging.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Template(_) => "template",
            Self::PerRecord => "per-record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct UppercaseKey;

    impl TemplateEngine for UppercaseKey {
        fn render(&self, record: &Record) -> std::result::Result<String, TemplateError> {
            Ok(record.id().to_uppercase())
        }
    }

    #[test]
    fn test_namespace_display() {
        assert_eq!(Namespace::default().to_string(), "<default>");
        assert_eq!(Namespace::new("prod").to_string(), "prod");
        assert!(Namespace::default().is_default());
        assert_eq!(Namespace::from("a").as_str(), "a");
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(NamespaceResolver::from_config(None).unwrap().mode(), "per-record");
        assert_eq!(NamespaceResolver::from_config(Some("")).unwrap().mode(), "per-record");
        assert_eq!(NamespaceResolver::from_config(Some("prod")).unwrap().mode(), "static");
        assert_eq!(
            NamespaceResolver::from_config(Some("{{ .Metadata.tenant }}"))
                .unwrap()
                .mode(),
            "template"
        );
    }

    #[test]
    fn test_bad_template_is_config_error() {
        let err = NamespaceResolver::from_config(Some("{{ .Bogus }}")).unwrap_err();
        assert!(matches!(err, PineconeSinkError::Config(_)));
    }

    #[test]
    fn test_static_ignores_metadata() {
        let resolver = NamespaceResolver::from_config(Some("prod")).unwrap();
        let record = Record::delete("k").with_collection("other");
        assert_eq!(resolver.resolve(&record).unwrap(), Namespace::new("prod"));
        assert_eq!(resolver.static_namespace(), Some(&Namespace::new("prod")));
    }

    #[test]
    fn test_per_record_reads_collection() {
        let resolver = NamespaceResolver::PerRecord;
        let record = Record::delete("k").with_collection("users");
        assert_eq!(resolver.resolve(&record).unwrap(), Namespace::new("users"));
        assert!(resolver.static_namespace().is_none());
    }

    #[test]
    fn test_per_record_missing_key_defaults() {
        let resolver = NamespaceResolver::PerRecord;
        let ns = resolver.resolve(&Record::delete("k")).unwrap();
        assert!(ns.is_default());
    }

    #[test]
    fn test_template_failure_propagates() {
        let resolver = NamespaceResolver::from_config(Some("{{ .Metadata.tenant }}")).unwrap();
        assert!(resolver.resolve(&Record::delete("k")).is_err());
    }

    #[test]
    fn test_custom_engine() {
        let resolver = NamespaceResolver::with_engine(UppercaseKey);
        let ns = resolver.resolve(&Record::delete("abc")).unwrap();
        assert_eq!(ns.as_str(), "ABC");
    }
}
