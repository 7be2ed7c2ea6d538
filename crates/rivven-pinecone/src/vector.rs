//! Record payload to [`Vector`] conversion
//!
//! The `after` image of every non-delete record is a JSON document:
//!
//! ```json
//! { "values": [0.1, 0.2], "sparse_values": { "indices": [3], "values": [0.5] } }
//! ```
//!
//! `values` is required; `sparse_values` and each of its arrays are optional.
//! Record metadata is carried over as string values, optionally filtered by a
//! key prefix which is stripped from the stored key.

use crate::client::{string_value, SparseValues, Vector};
use crate::record::Record;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Why a record payload could not be turned into a vector.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct VectorPayload {
    values: Vec<f32>,
    #[serde(default)]
    sparse_values: Option<SparsePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct SparsePayload {
    #[serde(default)]
    indices: Vec<u32>,
    #[serde(default)]
    values: Vec<f32>,
}

impl SparsePayload {
    fn into_sparse(self) -> Option<SparseValues> {
        if self.indices.is_empty() && self.values.is_empty() {
            return None;
        }
        Some(SparseValues {
            indices: self.indices,
            values: self.values,
        })
    }
}

/// Builds [`Vector`]s from records.
#[derive(Debug, Clone, Default)]
pub struct VectorParser {
    metadata_prefix: Option<String>,
}

impl VectorParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only carry metadata keys starting with `prefix`, stored without it.
    /// An empty prefix disables filtering.
    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.metadata_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn metadata_prefix(&self) -> Option<&str> {
        self.metadata_prefix.as_deref()
    }

    /// Convert an upsert-category record into a vector.
    pub fn parse(&self, record: &Record) -> Result<Vector, PayloadError> {
        let after = record
            .payload
            .after
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(PayloadError::Empty)?;

        let payload: VectorPayload = serde_json::from_slice(after)?;

        Ok(Vector {
            id: vector_id(record),
            values: payload.values,
            sparse_values: payload.sparse_values.and_then(SparsePayload::into_sparse),
            metadata: Some(self.metadata(record)),
        })
    }

    /// Record metadata as a protobuf `Struct` of string values.
    pub fn metadata(&self, record: &Record) -> prost_types::Struct {
        let fields: BTreeMap<String, prost_types::Value> = record
            .metadata
            .iter()
            .filter_map(|(k, v)| {
                let key = match &self.metadata_prefix {
                    Some(prefix) => k.strip_prefix(prefix.as_str())?,
                    None => k.as_str(),
                };
                Some((key.to_string(), string_value(v.as_str())))
            })
            .collect();
        prost_types::Struct { fields }
    }
}

/// The vector id for a record: its key, decoded lossily as UTF-8.
pub fn vector_id(record: &Record) -> String {
    record.id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::value::Kind;

    fn string_field<'a>(s: &'a prost_types::Struct, key: &str) -> Option<&'a str> {
        match s.fields.get(key)?.kind.as_ref()? {
            Kind::StringValue(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_dense_and_sparse() {
        let record = Record::update(
            "42",
            r#"{"values":[1,2],"sparse_values":{"indices":[5],"values":[0.5]}}"#,
        )
        .with_metadata("a", "b");

        let v = VectorParser::new().parse(&record).unwrap();
        assert_eq!(v.id, "42");
        assert_eq!(v.values, vec![1.0, 2.0]);
        assert_eq!(
            v.sparse_values,
            Some(SparseValues {
                indices: vec![5],
                values: vec![0.5]
            })
        );
        let metadata = v.metadata.unwrap();
        assert_eq!(metadata.fields.len(), 1);
        assert_eq!(string_field(&metadata, "a"), Some("b"));
    }

    #[test]
    fn test_sparse_absent_when_both_arrays_empty() {
        let parser = VectorParser::new();
        for payload in [
            r#"{"values":[1]}"#,
            r#"{"values":[1],"sparse_values":{}}"#,
            r#"{"values":[1],"sparse_values":{"indices":[],"values":[]}}"#,
        ] {
            let v = parser.parse(&Record::create("k", payload)).unwrap();
            assert!(v.sparse_values.is_none(), "payload {}", payload);
        }
    }

    #[test]
    fn test_empty_payload() {
        let parser = VectorParser::new();
        let missing = Record::new(crate::record::Operation::Create, "k");
        assert!(matches!(parser.parse(&missing), Err(PayloadError::Empty)));
        assert!(matches!(
            parser.parse(&Record::snapshot("k", "")),
            Err(PayloadError::Empty)
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let parser = VectorParser::new();
        for payload in ["not json", r#"{"sparse_values":{}}"#, r#"{"values":["x"]}"#] {
            let err = parser.parse(&Record::create("k", payload)).unwrap_err();
            assert!(matches!(err, PayloadError::Malformed(_)), "payload {}", payload);
        }
    }

    #[test]
    fn test_metadata_prefix_filter() {
        let record = Record::create("k", r#"{"values":[1]}"#)
            .with_metadata("pinecone.title", "hello")
            .with_metadata("pinecone.lang", "en")
            .with_collection("docs");

        let parser = VectorParser::new().with_metadata_prefix("pinecone.");
        let metadata = parser.parse(&record).unwrap().metadata.unwrap();
        assert_eq!(metadata.fields.len(), 2);
        assert_eq!(string_field(&metadata, "title"), Some("hello"));
        assert_eq!(string_field(&metadata, "lang"), Some("en"));
        assert!(!metadata.fields.contains_key("opencdc.collection"));
    }

    #[test]
    fn test_empty_prefix_passes_everything() {
        let parser = VectorParser::new().with_metadata_prefix("");
        assert!(parser.metadata_prefix().is_none());
        let record = Record::create("k", r#"{"values":[1]}"#).with_collection("docs");
        let metadata = parser.parse(&record).unwrap().metadata.unwrap();
        assert_eq!(string_field(&metadata, "opencdc.collection"), Some("docs"));
    }

    #[test]
    fn test_non_utf8_key_is_lossy() {
        let record = Record::new(crate::record::Operation::Create, vec![b'a', 0xff])
            .with_after(r#"{"values":[1]}"#);
        let v = VectorParser::new().parse(&record).unwrap();
        assert_eq!(v.id, "a\u{fffd}");
    }
}
