//! Namespace connection cache
//!
//! [`ConnectionRegistry`] owns one connection per namespace. Connections are
//! opened on first use, reused for the lifetime of the writer, and closed
//! exactly once by [`ConnectionRegistry::close_all`].
//!
//! The registry is an owned map behind `&mut self`: a writer processes one
//! call at a time, so no interior locking is needed.

use crate::client::{ClientError, Vector};
use crate::error::{CloseFailure, PineconeSinkError, Result};
use crate::metrics::metric_names;
use crate::namespace::Namespace;
use async_trait::async_trait;
use metrics::counter;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Opens namespace-scoped connections to an index.
#[async_trait]
pub trait IndexConnector: Send + Sync {
    type Connection: IndexConnection;

    /// Open a connection for `namespace`.
    async fn connect(
        &self,
        namespace: &Namespace,
    ) -> std::result::Result<Self::Connection, ClientError>;
}

/// Bulk operations on one namespace of an index.
#[async_trait]
pub trait IndexConnection: Send + Sync {
    /// Insert or replace `vectors`. Returns the number written.
    ///
    /// Takes the batch by value so it can move straight into the request.
    async fn upsert(&self, vectors: Vec<Vector>) -> std::result::Result<usize, ClientError>;

    /// Delete the vectors with the given ids. Returns the number deleted.
    async fn delete(&self, ids: Vec<String>) -> std::result::Result<usize, ClientError>;

    /// Release the connection.
    async fn close(self) -> std::result::Result<(), ClientError>;
}

/// Lazily populated namespace → connection map.
pub struct ConnectionRegistry<C: IndexConnector> {
    connector: C,
    connections: HashMap<Namespace, C::Connection>,
}

impl<C: IndexConnector> std::fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

impl<C: IndexConnector> ConnectionRegistry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connections: HashMap::new(),
        }
    }

    /// Connection for `namespace`, opening it on first use.
    ///
    /// A failed open is not cached; the next call tries again.
    pub async fn get_or_create(&mut self, namespace: &Namespace) -> Result<&C::Connection> {
        match self.connections.entry(namespace.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let connection = self.connector.connect(namespace).await.map_err(|e| {
                    PineconeSinkError::Connection {
                        namespace: namespace.clone(),
                        message: e.to_string(),
                    }
                })?;
                counter!(metric_names::CONNECTIONS_OPENED).increment(1);
                info!(namespace = %namespace, "Opened Pinecone namespace connection");
                Ok(entry.insert(connection))
            }
        }
    }

    pub fn contains(&self, namespace: &Namespace) -> bool {
        self.connections.contains_key(namespace)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Open namespaces, sorted.
    pub fn namespaces(&self) -> Vec<&Namespace> {
        let mut namespaces: Vec<_> = self.connections.keys().collect();
        namespaces.sort();
        namespaces
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Close every open connection.
    ///
    /// All connections are attempted even when some fail; the registry is
    /// empty afterwards either way.
    pub async fn close_all(&mut self) -> Result<()> {
        let mut connections: Vec<_> = self.connections.drain().collect();
        connections.sort_by(|a, b| a.0.cmp(&b.0));

        let mut failures = Vec::new();
        for (namespace, connection) in connections {
            match connection.close().await {
                Ok(()) => debug!(namespace = %namespace, "Closed Pinecone namespace connection"),
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        error = %e,
                        "Failed to close Pinecone namespace connection"
                    );
                    failures.push(CloseFailure {
                        namespace,
                        message: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PineconeSinkError::Close { failures })
        }
    }
}
