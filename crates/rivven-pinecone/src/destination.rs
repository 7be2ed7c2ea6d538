//! Pinecone destination lifecycle
//!
//! [`PineconeDestination`] ties configuration, the collection writer and the
//! gRPC connector together:
//!
//! 1. [`open`](PineconeDestination::open) validates the configuration and,
//!    for a static namespace, opens its connection up front so that bad
//!    credentials surface before the first write;
//! 2. [`write`](PineconeDestination::write) applies record slices in order;
//! 3. [`teardown`](PineconeDestination::teardown) closes every namespace
//!    connection.
//!
//! Templated and per-record namespaces are opened lazily on first use.

use crate::check::{CheckDetail, CheckResult};
use crate::client::{PineconeClientConfig, PineconeConnector};
use crate::config::PineconeSinkConfig;
use crate::error::Result;
use crate::record::Record;
use crate::registry::IndexConnector;
use crate::writer::{CollectionWriter, WriteError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A configured, open Pinecone destination.
#[derive(Debug)]
pub struct PineconeDestination<C: IndexConnector = PineconeConnector> {
    config: PineconeSinkConfig,
    writer: CollectionWriter<C>,
}

impl PineconeDestination<PineconeConnector> {
    /// Open a destination backed by the Pinecone gRPC data plane.
    pub async fn open(config: PineconeSinkConfig) -> Result<Self> {
        let connector = connector_for(&config);
        Self::open_with(config, connector).await
    }

    /// Validate `config` and probe the index with `DescribeIndexStats`.
    ///
    /// Never fails; every problem is reported as a failed check step.
    pub async fn check(config: &PineconeSinkConfig) -> CheckResult {
        let mut builder = CheckResult::builder();

        let t0 = Instant::now();
        if let Err(e) = config.validate_all() {
            return builder
                .check(
                    CheckDetail::failed("config", e.to_string())
                        .with_duration_ms(t0.elapsed().as_millis() as u64),
                )
                .build();
        }
        builder = builder
            .check(CheckDetail::passed("config").with_duration_ms(t0.elapsed().as_millis() as u64));

        let host = config.normalized_host();
        if host.starts_with("http://") {
            warn!(
                index_host = %host,
                "index_host uses unencrypted HTTP, API key transmitted in cleartext"
            );
        }
        info!(index_host = %host, namespace = ?config.namespace, "Checking Pinecone connectivity");

        let t1 = Instant::now();
        let client = match connector_for(config).client() {
            Ok(client) => client,
            Err(e) => {
                return builder
                    .check(CheckDetail::failed("connectivity", e.to_string()))
                    .build();
            }
        };

        let probe = tokio::time::timeout(config.timeout(), client.describe_index_stats()).await;
        let elapsed_ms = t1.elapsed().as_millis() as u64;
        match probe {
            Ok(Ok(stats)) => {
                info!(
                    dimension = stats.dimension,
                    total_vectors = stats.total_vector_count,
                    namespaces = stats.namespaces.len(),
                    "Pinecone index stats retrieved"
                );
                builder = builder.check(
                    CheckDetail::passed("connectivity")
                        .with_message(format!(
                            "dimension {}, {} vectors",
                            stats.dimension, stats.total_vector_count
                        ))
                        .with_duration_ms(elapsed_ms),
                );
            }
            Ok(Err(e)) => {
                let msg = format!("Failed to connect to Pinecone index: {}", e);
                warn!("{}", msg);
                builder = builder
                    .check(CheckDetail::failed("connectivity", msg).with_duration_ms(elapsed_ms));
            }
            Err(_) => {
                let msg = format!("DescribeIndexStats timed out after {}s", config.timeout_secs);
                warn!("{}", msg);
                builder = builder
                    .check(CheckDetail::failed("connectivity", msg).with_duration_ms(elapsed_ms));
            }
        }

        builder.build()
    }
}

impl<C: IndexConnector> PineconeDestination<C> {
    /// Open a destination over a custom connector.
    pub async fn open_with(config: PineconeSinkConfig, connector: C) -> Result<Self> {
        config.validate_all()?;

        let resolver = config.resolver()?;
        let mode = resolver.mode();
        let mut writer = CollectionWriter::new(resolver, config.parser(), connector);

        if let Some(namespace) = writer.resolver().static_namespace().cloned() {
            writer.open_namespace(&namespace).await?;
        }

        info!(
            index_host = %config.normalized_host(),
            namespace_mode = mode,
            metadata_prefix = ?config.metadata_prefix,
            timeout_secs = config.timeout_secs,
            "Opened Pinecone destination"
        );

        Ok(Self { config, writer })
    }

    /// Apply `records` in order. See [`CollectionWriter::write_records`].
    pub async fn write(&mut self, records: &[Record]) -> std::result::Result<usize, WriteError> {
        self.writer.write_records(records).await
    }

    /// Apply `records`, stopping between batches once `cancel` fires.
    pub async fn write_cancellable(
        &mut self,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> std::result::Result<usize, WriteError> {
        self.writer.write_records_cancellable(records, cancel).await
    }

    /// Close every namespace connection.
    pub async fn teardown(mut self) -> Result<()> {
        let open = self.writer.registry().len();
        let result = self.writer.close().await;
        match &result {
            Ok(()) => info!(connections = open, "Pinecone destination closed"),
            Err(e) => warn!(
                connections = open,
                error = %e,
                "Pinecone destination closed with errors"
            ),
        }
        result
    }

    pub fn config(&self) -> &PineconeSinkConfig {
        &self.config
    }

    pub fn writer(&self) -> &CollectionWriter<C> {
        &self.writer
    }
}

fn connector_for(config: &PineconeSinkConfig) -> PineconeConnector {
    PineconeConnector::new(
        PineconeClientConfig {
            api_key: config.api_key.clone(),
        },
        config.normalized_host(),
        config.timeout(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensitiveString;
    use crate::error::PineconeSinkError;
    use crate::namespace::Namespace;
    use crate::testing::{MockCall, MockConnector};

    fn config(namespace: Option<&str>) -> PineconeSinkConfig {
        PineconeSinkConfig {
            api_key: SensitiveString::new("sk-test"),
            index_host: "https://idx.svc.pinecone.io".to_string(),
            namespace: namespace.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_namespace_opened_eagerly() {
        let connector = MockConnector::new();
        let dest = PineconeDestination::open_with(config(Some("prod")), connector.clone())
            .await
            .unwrap();
        assert_eq!(
            connector.calls(),
            vec![MockCall::Connect {
                namespace: Namespace::new("prod")
            }]
        );
        assert!(dest.writer().registry().contains(&Namespace::new("prod")));
    }

    #[tokio::test]
    async fn test_dynamic_namespaces_opened_lazily() {
        for namespace in [None, Some("{{ .Metadata.tenant }}")] {
            let connector = MockConnector::new();
            PineconeDestination::open_with(config(namespace), connector.clone())
                .await
                .unwrap();
            assert!(connector.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_open_fails_on_bad_static_connection() {
        let connector = MockConnector::new();
        connector.fail_connect("prod");
        let err = PineconeDestination::open_with(config(Some("prod")), connector)
            .await
            .unwrap_err();
        assert!(matches!(err, PineconeSinkError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut bad = config(None);
        bad.api_key = SensitiveString::new("");
        let err = PineconeDestination::open_with(bad, MockConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PineconeSinkError::Config(_)));
    }

    #[tokio::test]
    async fn test_write_then_teardown() {
        let connector = MockConnector::new();
        let mut dest = PineconeDestination::open_with(config(None), connector.clone())
            .await
            .unwrap();

        let records = vec![
            Record::create("k1", r#"{"values":[1.0]}"#).with_collection("a"),
            Record::create("k2", r#"{"values":[1.0]}"#).with_collection("b"),
        ];
        assert_eq!(dest.write(&records).await.unwrap(), 2);
        dest.teardown().await.unwrap();
        assert_eq!(connector.close_count(), 2);
    }

    #[tokio::test]
    async fn test_check_reports_invalid_config() {
        let mut bad = config(None);
        bad.index_host = "https://bad host".to_string();
        let result = PineconeDestination::check(&bad).await;
        assert!(!result.is_success());
        assert!(!result.check("config").unwrap().passed);
        assert!(result.check("connectivity").is_none());
    }
}
