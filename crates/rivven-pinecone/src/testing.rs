//! Testing utilities
//!
//! [`MockConnector`] is an in-memory [`IndexConnector`] that records every
//! call in a shared journal and keeps a per-namespace vector store, so tests
//! can assert on call order and on the final index contents without a
//! Pinecone endpoint.
//!
//! # Example
//!
//! ```rust
//! use rivven_pinecone::prelude::*;
//! use rivven_pinecone::testing::MockConnector;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let connector = MockConnector::new();
//! let mut writer = CollectionWriter::new(
//!     NamespaceResolver::from_config(Some("docs")).unwrap(),
//!     VectorParser::new(),
//!     connector.clone(),
//! );
//!
//! let written = writer
//!     .write_records(&[Record::create("k1", r#"{"values":[0.5]}"#)])
//!     .await
//!     .unwrap();
//!
//! assert_eq!(written, 1);
//! assert_eq!(connector.stored_ids(&Namespace::new("docs")), vec!["k1"]);
//! # }
//! ```

use crate::client::{ClientError, Vector};
use crate::namespace::Namespace;
use crate::registry::{IndexConnection, IndexConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One observed interaction with the mock index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect { namespace: Namespace },
    Upsert { namespace: Namespace, ids: Vec<String> },
    Delete { namespace: Namespace, ids: Vec<String> },
    Close { namespace: Namespace },
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    store: BTreeMap<Namespace, BTreeMap<String, Vector>>,
    fail_connect: HashSet<Namespace>,
    fail_upsert: HashSet<Namespace>,
    fail_delete: HashSet<Namespace>,
    fail_close: HashSet<Namespace>,
    fail_bulk_call: Option<usize>,
    cancel_on_bulk_call: Option<(usize, CancellationToken)>,
    bulk_calls: usize,
}

impl MockState {
    /// Count a bulk call, fire a pending cancellation hook and decide
    /// whether the call should fail.
    fn bulk_should_fail(&mut self, injected: bool) -> bool {
        let n = self.bulk_calls;
        self.bulk_calls += 1;
        if let Some((_, token)) = self.cancel_on_bulk_call.as_ref().filter(|(at, _)| *at == n) {
            token.cancel();
        }
        injected || self.fail_bulk_call == Some(n)
    }
}

/// In-memory index used by unit and integration tests.
///
/// Clones share state, so a test keeps one handle for assertions and gives
/// another to the writer.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a new mock connector
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail for a namespace
    pub fn fail_connect(&self, namespace: impl Into<Namespace>) {
        self.state.lock().fail_connect.insert(namespace.into());
    }

    /// Make every upsert into a namespace fail
    pub fn fail_upsert(&self, namespace: impl Into<Namespace>) {
        self.state.lock().fail_upsert.insert(namespace.into());
    }

    /// Make every delete from a namespace fail
    pub fn fail_delete(&self, namespace: impl Into<Namespace>) {
        self.state.lock().fail_delete.insert(namespace.into());
    }

    /// Make `close` fail for a namespace
    pub fn fail_close(&self, namespace: impl Into<Namespace>) {
        self.state.lock().fail_close.insert(namespace.into());
    }

    /// Make the n-th bulk call (0-based, upserts and deletes combined) fail
    pub fn fail_bulk_call(&self, n: usize) {
        self.state.lock().fail_bulk_call = Some(n);
    }

    /// Cancel `token` while the n-th bulk call (0-based) is in flight
    pub fn cancel_on_bulk_call(&self, n: usize, token: CancellationToken) {
        self.state.lock().cancel_on_bulk_call = Some((n, token));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_connect.clear();
        state.fail_upsert.clear();
        state.fail_delete.clear();
        state.fail_close.clear();
        state.fail_bulk_call = None;
    }

    /// Every call seen so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Successful bulk calls, in order
    pub fn bulk_calls(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Upsert { .. } | MockCall::Delete { .. }))
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Connect { .. }))
    }

    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Close { .. }))
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Ids currently stored in a namespace, sorted
    pub fn stored_ids(&self, namespace: &Namespace) -> Vec<String> {
        self.state
            .lock()
            .store
            .get(namespace)
            .map(|vectors| vectors.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The stored vector with the given id, if any
    pub fn stored_vector(&self, namespace: &Namespace, id: &str) -> Option<Vector> {
        self.state.lock().store.get(namespace)?.get(id).cloned()
    }
}

#[async_trait]
impl IndexConnector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, namespace: &Namespace) -> Result<MockConnection, ClientError> {
        let mut state = self.state.lock();
        if state.fail_connect.contains(namespace) {
            return Err(ClientError::Connection(format!(
                "mock connect failure for {}",
                namespace
            )));
        }
        state.calls.push(MockCall::Connect {
            namespace: namespace.clone(),
        });
        Ok(MockConnection {
            namespace: namespace.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    namespace: Namespace,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl IndexConnection for MockConnection {
    async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize, ClientError> {
        let mut state = self.state.lock();
        let fail = state.fail_upsert.contains(&self.namespace);
        if state.bulk_should_fail(fail) {
            return Err(ClientError::Api {
                code: "Internal".to_string(),
                message: "mock upsert failure".to_string(),
            });
        }
        state.calls.push(MockCall::Upsert {
            namespace: self.namespace.clone(),
            ids: vectors.iter().map(|v| v.id.clone()).collect(),
        });
        let count = vectors.len();
        let store = state.store.entry(self.namespace.clone()).or_default();
        for vector in vectors {
            store.insert(vector.id.clone(), vector);
        }
        Ok(count)
    }

    async fn delete(&self, ids: Vec<String>) -> Result<usize, ClientError> {
        let mut state = self.state.lock();
        let fail = state.fail_delete.contains(&self.namespace);
        if state.bulk_should_fail(fail) {
            return Err(ClientError::Api {
                code: "Internal".to_string(),
                message: "mock delete failure".to_string(),
            });
        }
        state.calls.push(MockCall::Delete {
            namespace: self.namespace.clone(),
            ids: ids.clone(),
        });
        if let Some(store) = state.store.get_mut(&self.namespace) {
            for id in &ids {
                store.remove(id);
            }
        }
        Ok(ids.len())
    }

    async fn close(self) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Close {
            namespace: self.namespace.clone(),
        });
        if state.fail_close.contains(&self.namespace) {
            return Err(ClientError::Connection("mock close failure".to_string()));
        }
        Ok(())
    }
}
