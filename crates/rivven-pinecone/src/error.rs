//! Error types for rivven-pinecone
//!
//! Every failure carries enough position context (record index, namespace,
//! batch kind) for the caller to tell which records were applied.

use crate::batch::BatchKind;
use crate::namespace::Namespace;
use thiserror::Error;

/// Result type alias for sink operations
pub type Result<T> = std::result::Result<T, PineconeSinkError>;

/// Errors raised while batching and applying change records
#[derive(Debug, Error)]
pub enum PineconeSinkError {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// A non-delete record arrived without an `after` payload
    #[error("record {index}: empty payload")]
    EmptyPayload { index: usize },

    /// The `after` payload did not decode as a vector document
    #[error("record {index}: malformed payload: {source}")]
    MalformedPayload {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The namespace template could not be evaluated for a record
    #[error("record {index}: failed to execute namespace template: {message}")]
    TemplateEval { index: usize, message: String },

    /// Opening the connection for a namespace failed
    #[error("failed to connect to namespace {namespace}: {message}")]
    Connection {
        namespace: Namespace,
        message: String,
    },

    /// A bulk upsert or delete was rejected by the index
    #[error("failed to {kind} vectors in namespace {namespace}: {message}")]
    BulkOperation {
        namespace: Namespace,
        kind: BatchKind,
        message: String,
    },

    /// One or more connections failed to close
    #[error("failed to close {} connection(s): {}", .failures.len(), join_failures(.failures))]
    Close { failures: Vec<CloseFailure> },

    /// Cancellation was observed between two batches
    #[error("write cancelled")]
    Cancelled,
}

/// A single connection that failed to close during teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub namespace: Namespace,
    pub message: String,
}

fn join_failures(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.namespace, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PineconeSinkError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Index of the input record that caused the failure, if the failure is
    /// attributable to a single record.
    pub fn record_index(&self) -> Option<usize> {
        match self {
            Self::EmptyPayload { index }
            | Self::MalformedPayload { index, .. }
            | Self::TemplateEval { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether the failure happened while talking to the index (as opposed
    /// to rejecting input or configuration).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::BulkOperation { .. } | Self::Close { .. }
        )
    }
}
