//! In-process document store
//!
//! Behaves like a tiny document database keyed by endpoint: clients opened
//! against the same endpoint see the same data. Used by tests, benchmarks and
//! `memory://` endpoints. Outages can be simulated per endpoint.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::connection::{DatabaseClient, Driver, SessionCollection};
use crate::{Error, Result};

/// Documents of one endpoint: (database, collection) -> sessionId -> document
type Collections = HashMap<(String, String), HashMap<String, Document>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process [`Driver`]
#[derive(Default)]
pub struct MemoryDriver {
    servers: Mutex<HashMap<String, Arc<Mutex<Collections>>>>,
    unreachable: Mutex<HashSet<String>>,
    clients: Mutex<Vec<Arc<MemoryClient>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail (or succeed again) for an endpoint
    pub fn set_reachable(&self, endpoint: &str, reachable: bool) {
        let mut unreachable = lock(&self.unreachable);
        if reachable {
            unreachable.remove(endpoint);
        } else {
            unreachable.insert(endpoint.to_string());
        }
    }

    /// Drop the transport of every open client of an endpoint
    ///
    /// The endpoint itself stays reachable, so a reconnect succeeds.
    pub fn sever(&self, endpoint: &str) {
        for client in lock(&self.clients).iter() {
            if client.endpoint == endpoint {
                client.state.connected.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Number of successful `open` calls for one endpoint
    pub fn open_count_for(&self, endpoint: &str) -> usize {
        lock(&self.clients)
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }

    /// Every client opened so far, oldest first
    pub fn clients(&self) -> Vec<Arc<MemoryClient>> {
        lock(&self.clients).clone()
    }

    /// Raw session document as stored for an endpoint
    pub fn document(
        &self,
        endpoint: &str,
        database: &str,
        collection: &str,
        session_id: &str,
    ) -> Option<Document> {
        let server = lock(&self.servers).get(endpoint).cloned()?;
        let data = lock(&server);
        data.get(&(database.to_string(), collection.to_string()))
            .and_then(|sessions| sessions.get(session_id))
            .cloned()
    }

    /// Insert a document as-is, bypassing the push semantics
    pub fn insert_raw(
        &self,
        endpoint: &str,
        database: &str,
        collection: &str,
        session_id: &str,
        document: Document,
    ) {
        let server = self.server(endpoint);
        let mut data = lock(&server);
        data.entry((database.to_string(), collection.to_string()))
            .or_default()
            .insert(session_id.to_string(), document);
    }

    fn server(&self, endpoint: &str) -> Arc<Mutex<Collections>> {
        lock(&self.servers)
            .entry(endpoint.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, endpoint: &str) -> Result<Arc<dyn DatabaseClient>> {
        if lock(&self.unreachable).contains(endpoint) {
            return Err(Error::Connect(format!("{} is unreachable", endpoint)));
        }

        let client = Arc::new(MemoryClient {
            endpoint: endpoint.to_string(),
            data: self.server(endpoint),
            state: Arc::new(ClientState {
                connected: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }),
        });
        lock(&self.clients).push(Arc::clone(&client));
        debug!(endpoint = endpoint, "Opened in-memory client");

        Ok(client)
    }
}

struct ClientState {
    connected: AtomicBool,
    closed: AtomicBool,
}

impl ClientState {
    fn usable(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }
}

/// One in-process connection
pub struct MemoryClient {
    endpoint: String,
    data: Arc<Mutex<Collections>>,
    state: Arc<ClientState>,
}

impl MemoryClient {
    /// Whether `close` has been called on this client
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseClient for MemoryClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn is_connected(&self) -> bool {
        self.state.usable()
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "Closed in-memory client");
    }

    fn collection(&self, database: &str, collection: &str) -> Arc<dyn SessionCollection> {
        Arc::new(MemoryCollection {
            key: (database.to_string(), collection.to_string()),
            data: Arc::clone(&self.data),
            state: Arc::clone(&self.state),
        })
    }
}

struct MemoryCollection {
    key: (String, String),
    data: Arc<Mutex<Collections>>,
    state: Arc<ClientState>,
}

impl MemoryCollection {
    fn ensure_usable(&self) -> Result<()> {
        if self.state.usable() {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("connection is closed".to_string()))
        }
    }
}

#[async_trait]
impl SessionCollection for MemoryCollection {
    async fn find_session(&self, session_id: &str) -> Result<Option<Document>> {
        self.ensure_usable()?;
        let data = lock(&self.data);
        Ok(data
            .get(&self.key)
            .and_then(|sessions| sessions.get(session_id))
            .cloned())
    }

    async fn push_message(&self, session_id: &str, message: Document) -> Result<()> {
        self.ensure_usable()?;
        let mut data = lock(&self.data);
        let record = data
            .entry(self.key.clone())
            .or_default()
            .entry(session_id.to_string())
            .or_insert_with(|| doc! { "sessionId": session_id, "messages": [] });

        match record.get_mut("messages") {
            Some(Bson::Array(messages)) => {
                messages.push(Bson::Document(message));
                Ok(())
            }
            None => {
                record.insert("messages", vec![Bson::Document(message)]);
                Ok(())
            }
            Some(_) => Err(Error::StoreUnavailable(format!(
                "field 'messages' of session {} is not an array",
                session_id
            ))),
        }
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.ensure_usable()?;
        let mut data = lock(&self.data);
        if let Some(sessions) = data.get_mut(&self.key) {
            sessions.remove(session_id);
        }
        Ok(())
    }
}
