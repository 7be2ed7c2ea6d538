//! Sink configuration
//!
//! [`PineconeSinkConfig`] can be loaded three ways:
//!
//! - from YAML, with `${VAR}` / `${VAR:-default}` environment expansion
//!   ([`PineconeSinkConfig::from_file`], [`PineconeSinkConfig::from_yaml_str`]);
//! - from a flat string map using the camelCase keys of pipeline
//!   configuration (`apiKey`, `host`, `namespace`, `metadataPrefix`)
//!   ([`PineconeSinkConfig::from_map`]);
//! - by constructing the struct directly.
//!
//! ```yaml
//! api_key: ${PINECONE_API_KEY}
//! index_host: https://my-index-abc123.svc.us-east1-gcp.pinecone.io
//! namespace: "{{ index .Metadata \"opencdc.collection\" }}"
//! metadata_prefix: "pinecone."
//! ```

use crate::client::normalize_host;
use crate::error::{PineconeSinkError, Result};
use crate::namespace::NamespaceResolver;
use crate::vector::VectorParser;
use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use validator::Validate;

/// Pre-compiled regex for `${VAR}` / `${VAR:-default}` references.
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Valid index host URLs: HTTP(S) with optional port and path.
static INDEX_HOST_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^https?://[A-Za-z0-9._\-]+(:[0-9]+)?(/.*)?$")
        .expect("index host regex pattern is invalid - this is a bug")
});

/// A string that never shows up in logs or serialized config.
///
/// `Debug`/`Display` print `[REDACTED]`, serialization writes
/// `***REDACTED***`, and the value is zeroized on drop.
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value. Use only where the value is actually sent.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description = Some("API key. Redacted in logs.".to_string());
        }
        schema
    }
}

/// Configuration for the Pinecone sink
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct PineconeSinkConfig {
    /// Pinecone API key (required).
    #[serde(alias = "apiKey")]
    pub api_key: SensitiveString,

    /// Host URL of the index to write to (required).
    /// Example: `"https://my-index-abc123.svc.us-east1-gcp.pinecone.io"`
    #[serde(alias = "host")]
    #[validate(length(min = 1, max = 2048))]
    pub index_host: String,

    /// Target namespace. A fixed name, a template containing `{{` and `}}`
    /// evaluated per record, or unset to read `opencdc.collection` from
    /// each record's metadata.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Only metadata keys with this prefix are stored on the vector, with
    /// the prefix removed. Unset stores all metadata.
    #[serde(default, alias = "metadataPrefix")]
    pub metadata_prefix: Option<String>,

    /// Deadline in seconds for each bulk call.
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PineconeSinkConfig {
    fn default() -> Self {
        Self {
            api_key: SensitiveString::new(""),
            index_host: String::new(),
            namespace: None,
            metadata_prefix: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PineconeSinkConfig {
    /// Load configuration from a YAML file, expanding environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PineconeSinkError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML configuration, expanding environment variables.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| PineconeSinkError::config(format!("invalid YAML configuration: {}", e)))?;
        config.validate_all()?;
        Ok(config)
    }

    /// Build configuration from flat string settings.
    ///
    /// Accepts `apiKey` / `pinecone.apiKey`, `host` / `pinecone.hostURL`,
    /// `namespace`, `metadataPrefix` and `timeoutSecs`.
    pub fn from_map(settings: &HashMap<String, String>) -> Result<Self> {
        let get = |keys: &[&str]| keys.iter().find_map(|k| settings.get(*k)).cloned();

        let api_key = get(&["apiKey", "pinecone.apiKey", "api_key"])
            .ok_or_else(|| PineconeSinkError::config("missing required setting 'apiKey'"))?;
        let index_host = get(&["host", "pinecone.hostURL", "index_host"])
            .ok_or_else(|| PineconeSinkError::config("missing required setting 'host'"))?;
        let timeout_secs = match get(&["timeoutSecs", "timeout_secs"]) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                PineconeSinkError::config(format!("invalid 'timeoutSecs' value '{}': {}", raw, e))
            })?,
            None => default_timeout_secs(),
        };

        let config = Self {
            api_key: SensitiveString::new(api_key),
            index_host,
            namespace: get(&["namespace"]),
            metadata_prefix: get(&["metadataPrefix", "metadata_prefix"]),
            timeout_secs,
        };
        config.validate_all()?;
        Ok(config)
    }

    /// Validate that an index host URL is well-formed.
    pub fn validate_index_host(host: &str) -> std::result::Result<(), String> {
        if !INDEX_HOST_PATTERN.is_match(host) {
            return Err(format!(
                "Invalid index host '{}': must be a valid HTTP(S) URL",
                host
            ));
        }
        Ok(())
    }

    /// Run field validation plus the checks `validator` cannot express.
    pub fn validate_all(&self) -> Result<()> {
        if self.api_key.expose_secret().is_empty() {
            return Err(PineconeSinkError::config("api_key must not be empty"));
        }
        self.validate()
            .map_err(|e| PineconeSinkError::config(e.to_string()))?;
        Self::validate_index_host(&self.normalized_host()).map_err(PineconeSinkError::Config)?;
        // Parse the namespace template eagerly so a typo fails at startup.
        self.resolver()?;
        Ok(())
    }

    /// Namespace resolver for the configured `namespace`.
    pub fn resolver(&self) -> Result<NamespaceResolver> {
        NamespaceResolver::from_config(self.namespace.as_deref())
    }

    /// Vector parser for the configured metadata prefix.
    pub fn parser(&self) -> VectorParser {
        match &self.metadata_prefix {
            Some(prefix) => VectorParser::new().with_metadata_prefix(prefix.as_str()),
            None => VectorParser::new(),
        }
    }

    /// Index host with an `https://` scheme added when none is given.
    pub fn normalized_host(&self) -> String {
        normalize_host(&self.index_host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references.
/// Unset variables without a default expand to the empty string.
pub fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let default = caps.get(2).map(|m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sensitive_string_redacted() {
        let secret = SensitiveString::new("my-secret-password");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "my-secret-password");
        let serialized = serde_json::to_string(&secret).unwrap();
        assert_eq!(serialized, "\"***REDACTED***\"");
    }

    #[test]
    fn test_yaml_with_defaults() {
        let config = PineconeSinkConfig::from_yaml_str(
            "api_key: sk-123\nindex_host: https://idx.svc.pinecone.io\n",
        )
        .unwrap();
        assert_eq!(config.api_key.expose_secret(), "sk-123");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.namespace.is_none());
        assert_eq!(config.resolver().unwrap().mode(), "per-record");
    }

    #[test]
    fn test_yaml_aliases() {
        let config = PineconeSinkConfig::from_yaml_str(
            "apiKey: sk-123\nhost: https://idx.svc.pinecone.io\nmetadataPrefix: \"pinecone.\"\nnamespace: prod\n",
        )
        .unwrap();
        assert_eq!(config.index_host, "https://idx.svc.pinecone.io");
        assert_eq!(config.metadata_prefix.as_deref(), Some("pinecone."));
        assert_eq!(config.parser().metadata_prefix(), Some("pinecone."));
        assert_eq!(config.resolver().unwrap().mode(), "static");
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("RIVVEN_PINECONE_TEST_KEY", "sk-from-env");
        let expanded = expand_env_vars(
            "api_key: ${RIVVEN_PINECONE_TEST_KEY}\nnamespace: ${RIVVEN_PINECONE_UNSET_NS:-fallback}\n",
        );
        assert_eq!(expanded, "api_key: sk-from-env\nnamespace: fallback\n");
    }

    #[test]
    fn test_from_map() {
        let config = PineconeSinkConfig::from_map(&settings(&[
            ("apiKey", "sk-1"),
            ("host", "https://idx.svc.pinecone.io"),
            ("namespace", "{{ .Metadata.tenant }}"),
            ("timeoutSecs", "5"),
        ]))
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.resolver().unwrap().mode(), "template");
        assert!(config.metadata_prefix.is_none());
    }

    #[test]
    fn test_from_map_dotted_keys() {
        let config = PineconeSinkConfig::from_map(&settings(&[
            ("pinecone.apiKey", "sk-2"),
            ("pinecone.hostURL", "idx.svc.pinecone.io"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.expose_secret(), "sk-2");
        assert_eq!(config.normalized_host(), "https://idx.svc.pinecone.io");
    }

    #[test]
    fn test_from_map_missing_keys() {
        let err = PineconeSinkConfig::from_map(&settings(&[("host", "https://x.io")])).unwrap_err();
        assert!(err.to_string().contains("apiKey"));
        let err = PineconeSinkConfig::from_map(&settings(&[("apiKey", "k")])).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_from_map_bad_timeout() {
        let err = PineconeSinkConfig::from_map(&settings(&[
            ("apiKey", "k"),
            ("host", "https://x.io"),
            ("timeoutSecs", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PineconeSinkError::Config(_)));
    }

    #[test]
    fn test_validation_failures() {
        let base = PineconeSinkConfig {
            api_key: SensitiveString::new("k"),
            index_host: "https://idx.svc.pinecone.io".to_string(),
            ..Default::default()
        };
        assert!(base.validate_all().is_ok());

        let no_key = PineconeSinkConfig {
            api_key: SensitiveString::new(""),
            ..base.clone()
        };
        assert!(no_key.validate_all().is_err());

        let bad_host = PineconeSinkConfig {
            index_host: "https://bad host".to_string(),
            ..base.clone()
        };
        assert!(bad_host.validate_all().is_err());

        let bare_host = PineconeSinkConfig {
            index_host: "idx.svc.pinecone.io/".to_string(),
            ..base.clone()
        };
        assert!(bare_host.validate_all().is_ok());
        assert_eq!(bare_host.normalized_host(), "https://idx.svc.pinecone.io");

        let bad_timeout = PineconeSinkConfig {
            timeout_secs: 0,
            ..base.clone()
        };
        assert!(bad_timeout.validate_all().is_err());

        let bad_template = PineconeSinkConfig {
            namespace: Some("{{ .Nope }}".to_string()),
            ..base
        };
        assert!(bad_template.validate_all().is_err());
    }

    #[test]
    fn test_validate_index_host() {
        assert!(PineconeSinkConfig::validate_index_host("https://idx.svc.pinecone.io").is_ok());
        assert!(PineconeSinkConfig::validate_index_host("http://localhost:5081").is_ok());
        assert!(PineconeSinkConfig::validate_index_host("idx.svc.pinecone.io").is_err());
        assert!(PineconeSinkConfig::validate_index_host("").is_err());
    }

    #[test]
    fn test_json_schema_hides_secret_format() {
        let schema = schemars::schema_for!(PineconeSinkConfig);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("index_host"));
        assert!(json.contains("password"));
    }
}
