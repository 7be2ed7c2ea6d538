//! Change records consumed by the sink
//!
//! A [`Record`] is one change event from the upstream pipeline. The sink only
//! looks at the operation, the key, the metadata and the `after` image; the
//! `before` image is carried for completeness and ignored.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "operation": "create",
//!   "key": "doc-1",
//!   "metadata": { "opencdc.collection": "articles" },
//!   "payload": {
//!     "before": null,
//!     "after": "{\"values\": [0.1, 0.2]}"
//!   }
//! }
//! ```
//!
//! Byte fields (`key`, `before`, `after`) accept either a UTF-8 string or an
//! array of byte values.

use crate::batch::BatchKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key carrying the per-record collection (namespace) name.
pub const METADATA_COLLECTION_KEY: &str = "opencdc.collection";

/// Ordered string metadata attached to a record.
pub type Metadata = BTreeMap<String, String>;

/// Kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Snapshot,
}

impl Operation {
    /// The bulk operation this record contributes to.
    pub fn category(self) -> BatchKind {
        match self {
            Self::Create | Self::Update | Self::Snapshot => BatchKind::Upsert,
            Self::Delete => BatchKind::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after images of a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default, with = "wire::optional")]
    pub before: Option<Bytes>,
    #[serde(default, with = "wire::optional")]
    pub after: Option<Bytes>,
}

/// A single change-data-capture record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub operation: Operation,
    #[serde(with = "wire::required")]
    pub key: Bytes,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub payload: Change,
}

impl Record {
    /// Create a record with an empty payload and no metadata.
    pub fn new(operation: Operation, key: impl Into<Bytes>) -> Self {
        Self {
            operation,
            key: key.into(),
            metadata: Metadata::new(),
            payload: Change::default(),
        }
    }

    /// Create an insert record carrying the given `after` image.
    pub fn create(key: impl Into<Bytes>, after: impl Into<Bytes>) -> Self {
        Self::new(Operation::Create, key).with_after(after)
    }

    /// Create an update record carrying the given `after` image.
    pub fn update(key: impl Into<Bytes>, after: impl Into<Bytes>) -> Self {
        Self::new(Operation::Update, key).with_after(after)
    }

    /// Create a snapshot-read record carrying the given `after` image.
    pub fn snapshot(key: impl Into<Bytes>, after: impl Into<Bytes>) -> Self {
        Self::new(Operation::Snapshot, key).with_after(after)
    }

    /// Create a delete record.
    pub fn delete(key: impl Into<Bytes>) -> Self {
        Self::new(Operation::Delete, key)
    }

    /// Set the `after` image (builder-style)
    pub fn with_after(mut self, after: impl Into<Bytes>) -> Self {
        self.payload.after = Some(after.into());
        self
    }

    /// Add a metadata entry (builder-style)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the collection metadata entry (builder-style)
    pub fn with_collection(self, collection: impl Into<String>) -> Self {
        self.with_metadata(METADATA_COLLECTION_KEY, collection)
    }

    /// The collection named in the record metadata, if any.
    pub fn collection(&self) -> Option<&str> {
        self.metadata.get(METADATA_COLLECTION_KEY).map(String::as_str)
    }

    /// The record key rendered as a vector id.
    pub fn id(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// Serde adapters for byte fields that arrive as strings or byte arrays.
mod wire {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawBytes {
        Text(String),
        Raw(Vec<u8>),
    }

    impl From<RawBytes> for Bytes {
        fn from(raw: RawBytes) -> Self {
            match raw {
                RawBytes::Text(s) => Bytes::from(s),
                RawBytes::Raw(v) => Bytes::from(v),
            }
        }
    }

    fn write<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(s) => serializer.serialize_str(s),
            Err(_) => serializer.collect_seq(bytes.iter()),
        }
    }

    pub mod required {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
            write(bytes, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
            RawBytes::deserialize(deserializer).map(Bytes::from)
        }
    }

    pub mod optional {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Bytes>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => write(b, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Bytes>, D::Error> {
            Ok(Option::<RawBytes>::deserialize(deserializer)?.map(Bytes::from))
        }
    }
}
