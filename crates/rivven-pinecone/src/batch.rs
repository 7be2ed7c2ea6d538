//! Order-preserving batching of change records
//!
//! Records are grouped in a single left-to-right pass. A batch stays open as
//! long as consecutive records share both the namespace and the operation
//! category; any change closes it and starts a new one. Batches are never
//! merged across a gap, so applying them in order reproduces the input order.
//!
//! ```text
//! Update(k1) Delete(k2) Delete(k3) Create(k4) Create(k5)
//! └Upsert┘   └── Delete ──────┘    └──── Upsert ────┘
//! ```

use crate::client::Vector;
use crate::error::{PineconeSinkError, Result};
use crate::namespace::{Namespace, NamespaceResolver};
use crate::record::Record;
use crate::vector::{PayloadError, VectorParser};
use std::fmt;

/// Bulk operation a batch is submitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Upsert,
    Delete,
}

impl BatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A homogeneous, single-namespace group of operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Upsert {
        namespace: Namespace,
        vectors: Vec<Vector>,
    },
    Delete {
        namespace: Namespace,
        ids: Vec<String>,
    },
}

impl Batch {
    pub fn kind(&self) -> BatchKind {
        match self {
            Self::Upsert { .. } => BatchKind::Upsert,
            Self::Delete { .. } => BatchKind::Delete,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        match self {
            Self::Upsert { namespace, .. } | Self::Delete { namespace, .. } => namespace,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Upsert { vectors, .. } => vectors.len(),
            Self::Delete { ids, .. } => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector ids in the batch, in record order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Upsert { vectors, .. } => vectors.iter().map(|v| v.id.as_str()).collect(),
            Self::Delete { ids, .. } => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// One record turned into the element its batch holds.
enum Entry {
    Vector(Vector),
    Id(String),
}

/// Incremental batch construction.
///
/// Each [`push`](Self::push) either extends the open batch or starts a new
/// one. A failed push leaves the batches built so far untouched.
#[derive(Debug)]
pub struct BatchBuilder<'a> {
    resolver: &'a NamespaceResolver,
    parser: &'a VectorParser,
    batches: Vec<Batch>,
    next_index: usize,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(resolver: &'a NamespaceResolver, parser: &'a VectorParser) -> Self {
        Self {
            resolver,
            parser,
            batches: Vec::new(),
            next_index: 0,
        }
    }

    /// Add the next record of the input sequence.
    pub fn push(&mut self, record: &Record) -> Result<()> {
        let index = self.next_index;

        let namespace = self
            .resolver
            .resolve(record)
            .map_err(|e| PineconeSinkError::TemplateEval {
                index,
                message: e.to_string(),
            })?;

        let entry = match record.operation.category() {
            BatchKind::Delete => Entry::Id(record.id()),
            BatchKind::Upsert => Entry::Vector(self.parser.parse(record).map_err(|e| match e {
                PayloadError::Empty => PineconeSinkError::EmptyPayload { index },
                PayloadError::Malformed(source) => {
                    PineconeSinkError::MalformedPayload { index, source }
                }
            })?),
        };

        match (self.batches.last_mut(), entry) {
            (Some(Batch::Upsert { namespace: ns, vectors }), Entry::Vector(v))
                if *ns == namespace =>
            {
                vectors.push(v)
            }
            (Some(Batch::Delete { namespace: ns, ids }), Entry::Id(id)) if *ns == namespace => {
                ids.push(id)
            }
            (_, Entry::Vector(v)) => self.batches.push(Batch::Upsert {
                namespace,
                vectors: vec![v],
            }),
            (_, Entry::Id(id)) => self.batches.push(Batch::Delete {
                namespace,
                ids: vec![id],
            }),
        }

        self.next_index += 1;
        Ok(())
    }

    /// Batches built so far; the last one is still open.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Number of records accepted so far.
    pub fn records(&self) -> usize {
        self.next_index
    }

    pub fn finish(self) -> Vec<Batch> {
        self.batches
    }
}

/// Group `records` into ordered, maximal, homogeneous batches.
pub fn build_batches(
    records: &[Record],
    resolver: &NamespaceResolver,
    parser: &VectorParser,
) -> Result<Vec<Batch>> {
    let mut builder = BatchBuilder::new(resolver, parser);
    for record in records {
        builder.push(record)?;
    }
    Ok(builder.finish())
}
