//! Collection writer
//!
//! Applies a record sequence to the index: batches are built up front, then
//! submitted one bulk call at a time, in order. The first failure stops the
//! call; batches that already completed stay applied, and
//! [`WriteError::written`] reports how many records they covered.

use crate::batch::{build_batches, Batch, BatchKind};
use crate::error::PineconeSinkError;
use crate::metrics::{record_batch_failure, record_batch_started, record_batch_success};
use crate::namespace::{Namespace, NamespaceResolver};
use crate::record::Record;
use crate::registry::{ConnectionRegistry, IndexConnection, IndexConnector};
use crate::vector::VectorParser;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A failed write, with the number of records applied before the failure.
#[derive(Debug, thiserror::Error)]
#[error("write failed after {written} record(s): {source}")]
pub struct WriteError {
    /// Records applied by fully completed batches.
    pub written: usize,
    /// Index of the batch that failed, when the failure happened while
    /// applying batches.
    pub batch_index: Option<usize>,
    #[source]
    pub source: PineconeSinkError,
}

impl WriteError {
    fn new(written: usize, batch_index: Option<usize>, source: PineconeSinkError) -> Self {
        Self {
            written,
            batch_index,
            source,
        }
    }

    pub fn into_inner(self) -> PineconeSinkError {
        self.source
    }
}

/// Writes records into one index, one namespace connection at a time.
#[derive(Debug)]
pub struct CollectionWriter<C: IndexConnector> {
    resolver: NamespaceResolver,
    parser: VectorParser,
    registry: ConnectionRegistry<C>,
}

impl<C: IndexConnector> CollectionWriter<C> {
    pub fn new(resolver: NamespaceResolver, parser: VectorParser, connector: C) -> Self {
        Self {
            resolver,
            parser,
            registry: ConnectionRegistry::new(connector),
        }
    }

    /// Group records without writing them.
    pub fn build_batches(&self, records: &[Record]) -> crate::error::Result<Vec<Batch>> {
        build_batches(records, &self.resolver, &self.parser)
    }

    /// Write `records` in order. Returns the number of records applied.
    pub async fn write_records(&mut self, records: &[Record]) -> Result<usize, WriteError> {
        self.write_inner(records, None).await
    }

    /// Like [`write_records`](Self::write_records), but stops between batches
    /// once `cancel` fires. A batch in flight is always completed.
    pub async fn write_records_cancellable(
        &mut self,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> Result<usize, WriteError> {
        self.write_inner(records, Some(cancel)).await
    }

    async fn write_inner(
        &mut self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> Result<usize, WriteError> {
        if records.is_empty() {
            return Ok(0);
        }

        let batches = self
            .build_batches(records)
            .map_err(|e| WriteError::new(0, None, e))?;

        debug!(
            records = records.len(),
            batches = batches.len(),
            mode = self.resolver.mode(),
            "Built Pinecone batches"
        );

        let total = batches.len();
        let mut written = 0;
        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(written, remaining_batches = total - index, "Pinecone write cancelled");
                return Err(WriteError::new(written, Some(index), PineconeSinkError::Cancelled));
            }

            let namespace = batch.namespace().clone();
            let kind = batch.kind();
            match self.write_batch(batch).await {
                Ok(count) => written += count,
                Err(e) => {
                    error!(
                        batch_index = index,
                        namespace = %namespace,
                        kind = %kind,
                        written,
                        error = %e,
                        "Pinecone batch failed"
                    );
                    return Err(WriteError::new(written, Some(index), e));
                }
            }
        }

        info!(written, batches = total, "Pinecone write complete");
        Ok(written)
    }

    /// Send one batch, moving its vectors or ids into the bulk call.
    async fn write_batch(&mut self, batch: Batch) -> crate::error::Result<usize> {
        let namespace = batch.namespace().clone();
        let kind = batch.kind();
        let size = batch.len();
        let connection = self.registry.get_or_create(&namespace).await?;

        record_batch_started(size);
        let start = Instant::now();
        let result = match batch {
            Batch::Upsert { vectors, .. } => connection.upsert(vectors).await,
            Batch::Delete { ids, .. } => connection.delete(ids).await,
        };
        let elapsed = start.elapsed();

        match result {
            Ok(count) => {
                record_batch_success(kind, count, elapsed);
                debug!(
                    namespace = %namespace,
                    kind = %kind,
                    size,
                    count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Pinecone batch applied"
                );
                Ok(count)
            }
            Err(e) => {
                record_batch_failure(elapsed);
                Err(bulk_error(&namespace, kind, e))
            }
        }
    }

    /// Make sure the connection for `namespace` is open.
    pub async fn open_namespace(&mut self, namespace: &Namespace) -> crate::error::Result<()> {
        self.registry.get_or_create(namespace).await.map(|_| ())
    }

    /// Close every connection opened by this writer.
    pub async fn close(&mut self) -> crate::error::Result<()> {
        self.registry.close_all().await
    }

    pub fn resolver(&self) -> &NamespaceResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }
}

fn bulk_error(
    namespace: &Namespace,
    kind: BatchKind,
    e: crate::client::ClientError,
) -> PineconeSinkError {
    PineconeSinkError::BulkOperation {
        namespace: namespace.clone(),
        kind,
        message: e.to_string(),
    }
}
