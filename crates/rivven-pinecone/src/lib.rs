//! rivven-pinecone - Order-preserving CDC sink for Pinecone vector indexes
//!
//! Takes an ordered stream of change records (create, update, snapshot,
//! delete) and applies it to a Pinecone index as bulk `Upsert` and `Delete`
//! calls.
//!
//! # Architecture
//!
//! ```text
//! records ──► NamespaceResolver ──► BatchBuilder ──► CollectionWriter ──► ConnectionRegistry ──► index
//!             (static / template /   (same namespace    (one bulk call      (one connection per
//!              per-record)            + same kind)       per batch, in       namespace, opened
//!                                                        order, fail fast)   lazily)
//! ```
//!
//! Consecutive records that share a namespace and an operation category are
//! grouped into one batch; anything else starts a new batch. Applying the
//! batches in order therefore reproduces the input order exactly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rivven_pinecone::prelude::*;
//!
//! let config = PineconeSinkConfig::from_file("pinecone.yaml")?;
//! let mut destination = PineconeDestination::open(config).await?;
//!
//! let written = destination.write(&records).await?;
//! destination.teardown().await?;
//! ```
//!
//! Tests and embedders can swap the gRPC connector for any
//! [`IndexConnector`], e.g. [`testing::MockConnector`].

pub mod batch;
pub mod check;
pub mod client;
pub mod config;
pub mod destination;
pub mod error;
pub mod metrics;
pub mod namespace;
pub mod record;
pub mod registry;
pub mod template;
pub mod testing;
pub mod vector;
pub mod writer;

pub use batch::{build_batches, Batch, BatchBuilder, BatchKind};
pub use check::{CheckDetail, CheckResult};
pub use client::{ClientError, PineconeClient, PineconeConnector, SparseValues, Vector};
pub use config::{PineconeSinkConfig, SensitiveString};
pub use destination::PineconeDestination;
pub use error::{CloseFailure, PineconeSinkError, Result};
pub use namespace::{Namespace, NamespaceResolver};
pub use record::{Operation, Record, METADATA_COLLECTION_KEY};
pub use registry::{ConnectionRegistry, IndexConnection, IndexConnector};
pub use template::{PlaceholderTemplate, TemplateEngine, TemplateError};
pub use vector::{PayloadError, VectorParser};
pub use writer::{CollectionWriter, WriteError};

/// Common imports
pub mod prelude {
    pub use crate::{
        build_batches, Batch, BatchKind, CollectionWriter, IndexConnection, IndexConnector,
        Namespace, NamespaceResolver, Operation, PineconeDestination, PineconeSinkConfig,
        PineconeSinkError, Record, TemplateEngine, Vector, VectorParser, WriteError,
    };
    pub use tokio_util::sync::CancellationToken;
}
