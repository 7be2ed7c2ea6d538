//! Pinecone data-plane access over gRPC (`tonic` + rustls).
//!
//! Only the data-plane operations the sink needs are implemented:
//!
//! - `VectorService/Upsert`: bulk vector upsert
//! - `VectorService/Delete`: bulk delete by id
//! - `VectorService/DescribeIndexStats`: connectivity / dimension probe
//!
//! Every request carries the API key in the `api-key` metadata header.
//!
//! [`PineconeConnector`] and [`PineconeConnection`] adapt the client to the
//! [`IndexConnector`] / [`IndexConnection`] seam used by the writer: one
//! connection per namespace, each with its own lazily connected channel.

use std::time::Duration;

use async_trait::async_trait;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig};
use tonic::{Request, Status};
use tracing::debug;

use crate::config::SensitiveString;
use crate::namespace::Namespace;
use crate::registry::{IndexConnection, IndexConnector};

// --- errors ---

/// Failure of a single data-plane RPC.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Channel could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The index answered with a non-OK status.
    #[error("index returned {code}: {message}")]
    Api { code: String, message: String },

    /// Request timed out (gRPC `DeadlineExceeded` or local deadline).
    #[error("timeout: {0}")]
    Timeout(String),
}

impl ClientError {
    /// Whether a caller-side retry has a chance of succeeding.
    ///
    /// The sink itself never retries; this is exposed for callers that wrap
    /// the writer in their own retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Api { code, .. } => {
                matches!(code.as_str(), "ResourceExhausted" | "Internal" | "Unknown")
            }
        }
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        let code = status.code();
        let message = status.message().to_string();
        let code_name = format!("{:?}", code);

        match code {
            tonic::Code::DeadlineExceeded => Self::Timeout(message),
            tonic::Code::Unavailable | tonic::Code::Aborted | tonic::Code::Cancelled => {
                Self::Connection(format!("{} ({})", message, code_name))
            }
            _ => Self::Api {
                code: code_name,
                message,
            },
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(e: tonic::transport::Error) -> Self {
        ClientError::Connection(e.to_string())
    }
}

// --- VectorService messages ---
//
// Tag numbers follow the Pinecone data-plane proto.

/// Sparse vector component (indices + values).
#[derive(Clone, PartialEq, prost::Message)]
pub struct SparseValues {
    #[prost(uint32, repeated, tag = "1")]
    pub indices: Vec<u32>,
    #[prost(float, repeated, tag = "2")]
    pub values: Vec<f32>,
}

/// A dense (and optionally sparse) vector.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Vector {
    /// Unique vector ID.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Dense embedding values.
    #[prost(float, repeated, tag = "2")]
    pub values: Vec<f32>,
    /// Metadata key-value pairs (protobuf Struct).
    #[prost(message, optional, tag = "3")]
    pub metadata: Option<prost_types::Struct>,
    /// Sparse component; `None` when the record carries none.
    #[prost(message, optional, tag = "5")]
    pub sparse_values: Option<SparseValues>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpsertRequest {
    #[prost(message, repeated, tag = "1")]
    pub vectors: Vec<Vector>,
    #[prost(string, tag = "2")]
    pub namespace: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpsertResponse {
    #[prost(uint32, tag = "1")]
    pub upserted_count: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteRequest {
    #[prost(string, repeated, tag = "1")]
    pub ids: Vec<String>,
    #[prost(bool, tag = "2")]
    pub delete_all: bool,
    #[prost(string, tag = "3")]
    pub namespace: String,
    #[prost(message, optional, tag = "4")]
    pub filter: Option<prost_types::Struct>,
}

/// Delete returns an empty message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DescribeIndexStatsRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: Option<prost_types::Struct>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NamespaceSummary {
    #[prost(uint32, tag = "1")]
    pub vector_count: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DescribeIndexStatsResponse {
    #[prost(map = "string, message", tag = "1")]
    pub namespaces: std::collections::HashMap<String, NamespaceSummary>,
    #[prost(uint32, tag = "2")]
    pub dimension: u32,
    #[prost(float, tag = "3")]
    pub index_fullness: f32,
    #[prost(uint32, tag = "4")]
    pub total_vector_count: u32,
}

/// Wrap a string as a protobuf `Value`.
#[inline]
pub fn string_value(s: impl Into<String>) -> prost_types::Value {
    prost_types::Value {
        kind: Some(prost_types::value::Kind::StringValue(s.into())),
    }
}

// --- client ---

/// Credentials for [`PineconeClient`].
#[derive(Debug, Clone)]
pub struct PineconeClientConfig {
    pub api_key: SensitiveString,
}

/// Adds the `api-key` header to every outgoing request.
#[derive(Clone)]
struct ApiKeyInterceptor {
    api_key: AsciiMetadataValue,
}

impl Interceptor for ApiKeyInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("api-key", self.api_key.clone());
        Ok(request)
    }
}

type InnerGrpc = tonic::client::Grpc<
    tonic::service::interceptor::InterceptedService<Channel, ApiKeyInterceptor>,
>;

/// Normalize an index host: add `https://` when no scheme is given and
/// strip trailing slashes.
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Data-plane client for one Pinecone index.
///
/// The channel connects lazily on the first RPC, so construction only
/// validates the endpoint and API key.
#[derive(Clone)]
pub struct PineconeClient {
    inner: InnerGrpc,
}

impl std::fmt::Debug for PineconeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeClient")
            .field("transport", &"gRPC")
            .finish()
    }
}

impl PineconeClient {
    /// Build a client for `host`; a missing scheme defaults to `https://`.
    pub fn new(config: &PineconeClientConfig, host: &str) -> Result<Self, ClientError> {
        let user_agent = concat!("rivven-pinecone/", env!("CARGO_PKG_VERSION"));

        let endpoint = Channel::from_shared(normalize_host(host))
            .map_err(|e| ClientError::Connection(format!("invalid endpoint: {}", e)))?
            .user_agent(user_agent)
            .map_err(|e| ClientError::Connection(format!("invalid user-agent: {}", e)))?
            .tls_config(ClientTlsConfig::new().with_webpki_roots())
            .map_err(|e| ClientError::Connection(format!("invalid TLS configuration: {}", e)))?
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            // PING frames keep idle connections alive behind cloud load balancers
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(20))
            .keep_alive_while_idle(true)
            .http2_adaptive_window(true);

        let channel = endpoint.connect_lazy();

        let api_key: AsciiMetadataValue = config.api_key.expose_secret().parse().map_err(|_| {
            ClientError::Connection("API key is not a valid header value".to_string())
        })?;

        let intercepted = tonic::service::interceptor::InterceptedService::new(
            channel,
            ApiKeyInterceptor { api_key },
        );

        Ok(Self {
            inner: tonic::client::Grpc::new(intercepted),
        })
    }

    async fn unary<Req, Resp>(&self, request: Req, path: &'static str) -> Result<Resp, ClientError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut client = self.inner.clone();
        client
            .ready()
            .await
            .map_err(|e| ClientError::Connection(format!("channel not ready: {}", e)))?;

        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        let path = tonic::codegen::http::uri::PathAndQuery::from_static(path);

        let response = client
            .unary(tonic::Request::new(request), path, codec)
            .await?;
        Ok(response.into_inner())
    }

    /// Upsert vectors into a namespace. Returns the upserted count.
    pub async fn upsert(
        &self,
        vectors: Vec<Vector>,
        namespace: &Namespace,
    ) -> Result<u32, ClientError> {
        let request = UpsertRequest {
            vectors,
            namespace: namespace.as_str().to_string(),
        };
        let response: UpsertResponse = self.unary(request, "/VectorService/Upsert").await?;
        Ok(response.upserted_count)
    }

    /// Delete vectors by id from a namespace.
    pub async fn delete(&self, ids: Vec<String>, namespace: &Namespace) -> Result<(), ClientError> {
        let request = DeleteRequest {
            ids,
            delete_all: false,
            namespace: namespace.as_str().to_string(),
            filter: None,
        };
        let _: DeleteResponse = self.unary(request, "/VectorService/Delete").await?;
        Ok(())
    }

    /// Index dimension, fullness and per-namespace vector counts.
    pub async fn describe_index_stats(&self) -> Result<DescribeIndexStatsResponse, ClientError> {
        self.unary(
            DescribeIndexStatsRequest { filter: None },
            "/VectorService/DescribeIndexStats",
        )
        .await
    }
}

// --- connector ---

/// Opens one [`PineconeConnection`] per namespace of a single index.
#[derive(Debug, Clone)]
pub struct PineconeConnector {
    config: PineconeClientConfig,
    host: String,
    timeout: Duration,
}

impl PineconeConnector {
    pub fn new(config: PineconeClientConfig, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            config,
            host: host.into(),
            timeout,
        }
    }

    /// Build a standalone client, e.g. for a connectivity check.
    pub fn client(&self) -> Result<PineconeClient, ClientError> {
        PineconeClient::new(&self.config, &self.host)
    }
}

#[async_trait]
impl IndexConnector for PineconeConnector {
    type Connection = PineconeConnection;

    async fn connect(&self, namespace: &Namespace) -> Result<PineconeConnection, ClientError> {
        let client = self.client()?;
        debug!(namespace = %namespace, host = %self.host, "created pinecone index client");
        Ok(PineconeConnection {
            client,
            namespace: namespace.clone(),
            timeout: self.timeout,
        })
    }
}

/// A namespace-scoped handle on a Pinecone index.
#[derive(Debug)]
pub struct PineconeConnection {
    client: PineconeClient,
    namespace: Namespace,
    timeout: Duration,
}

impl PineconeConnection {
    async fn with_deadline<T>(
        &self,
        op: &str,
        fut: impl std::future::Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ClientError::Timeout(format!(
                "{} timed out after {}s",
                op,
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl IndexConnection for PineconeConnection {
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize, ClientError> {
        let count = self
            .with_deadline("Upsert", self.client.upsert(vectors, &self.namespace))
            .await?;
        Ok(count as usize)
    }

    async fn delete(&self, ids: Vec<String>) -> Result<usize, ClientError> {
        let count = ids.len();
        self.with_deadline("Delete", self.client.delete(ids, &self.namespace))
            .await?;
        Ok(count)
    }

    async fn close(self) -> Result<(), ClientError> {
        // Dropping the last clone of the channel tears down the HTTP/2 connection.
        drop(self.client);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn test_config(key: &str) -> PineconeClientConfig {
        PineconeClientConfig {
            api_key: SensitiveString::new(key),
        }
    }

    #[test]
    fn test_present_empty_sparse_values_are_encoded() {
        let dense_only = Vector {
            id: "v1".to_string(),
            values: vec![0.5],
            metadata: None,
            sparse_values: None,
        };
        let with_empty = Vector {
            sparse_values: Some(SparseValues::default()),
            ..dense_only.clone()
        };
        // A present but empty sparse message still occupies field 5.
        assert!(with_empty.encode_to_vec().len() > dense_only.encode_to_vec().len());
    }

    #[test]
    fn test_delete_request_wire_fields() {
        let req = DeleteRequest {
            ids: vec!["a".to_string(), "b".to_string()],
            delete_all: false,
            namespace: "docs".to_string(),
            filter: None,
        };
        let decoded = DeleteRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.ids, vec!["a", "b"]);
        assert_eq!(decoded.namespace, "docs");
        assert!(!decoded.delete_all);
        assert!(DeleteResponse::decode(&[][..]).is_ok());
    }

    #[test]
    fn test_from_grpc_status() {
        match ClientError::from(Status::unauthenticated("bad key")) {
            ClientError::Api { code, message } => {
                assert_eq!(code, "Unauthenticated");
                assert_eq!(message, "bad key");
            }
            other => panic!("Expected Api variant, got {:?}", other),
        }
        assert!(matches!(
            ClientError::from(Status::deadline_exceeded("30s")),
            ClientError::Timeout(_)
        ));
        assert!(matches!(
            ClientError::from(Status::unavailable("down")),
            ClientError::Connection(_)
        ));
        assert!(matches!(
            ClientError::from(Status::cancelled("bye")),
            ClientError::Connection(_)
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::from(Status::unavailable("down")).is_retryable());
        assert!(ClientError::from(Status::resource_exhausted("slow down")).is_retryable());
        assert!(!ClientError::from(Status::invalid_argument("dimension mismatch")).is_retryable());
        assert!(!ClientError::from(Status::permission_denied("no")).is_retryable());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("idx.svc.pinecone.io"), "https://idx.svc.pinecone.io");
        assert_eq!(normalize_host("https://idx.svc.pinecone.io///"), "https://idx.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5081/"), "http://localhost:5081");
    }

    #[tokio::test]
    async fn test_client_construction_is_lazy() {
        assert!(PineconeClient::new(&test_config("k"), "https://idx.svc.pinecone.io/").is_ok());
        assert!(PineconeClient::new(&test_config("k"), "http://localhost:5081").is_ok());
    }

    #[tokio::test]
    async fn test_invalid_api_key_rejected() {
        for bad_key in ["key\nnewline", "key\rcarriage", "key\0null"] {
            let result = PineconeClient::new(&test_config(bad_key), "https://test.pinecone.io");
            assert!(result.is_err(), "API key {:?} should be rejected", bad_key);
        }
    }

    #[tokio::test]
    async fn test_debug_does_not_leak_key() {
        let connector = PineconeConnector::new(
            test_config("sk-SECRET-KEY-12345"),
            "https://test.pinecone.io",
            Duration::from_secs(5),
        );
        let connection = connector.connect(&Namespace::new("docs")).await.unwrap();
        let debug = format!("{:?} {:?}", connector, connection);
        assert!(!debug.contains("SECRET"), "Debug output leaked key: {}", debug);
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_client_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PineconeClient>();
        assert_send_sync::<PineconeConnection>();
    }
}
