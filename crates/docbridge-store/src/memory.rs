//! In-memory implementation of the store gateway.
//!
//! This is primarily for testing. A [`MemoryServer`] stands in for the
//! remote document store: it outlives connections, so stores created through
//! one connection are visible to the next, and it counts connects, closes and
//! store creations so tests can assert on lifecycle behaviour.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use docbridge_core::{ConnectionDescriptor, Document, DocumentId};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::{Connection, Connector, DocumentStore};

/// Shared state for an in-memory document store server.
pub struct MemoryServer {
    /// Stores by name.
    stores: Mutex<HashMap<String, Arc<RwLock<StoreData>>>>,
    /// Password every connection must present, if any.
    required_password: Option<String>,
    /// Refuse all connections.
    unreachable: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    creates: AtomicUsize,
}

#[derive(Default)]
struct StoreData {
    /// Documents in insertion order.
    documents: Vec<Document>,
    /// Identity -> position in `documents`.
    index: HashMap<DocumentId, usize>,
}

impl MemoryServer {
    /// Create a new server that accepts any credentials.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a server that only accepts the given password.
    pub fn with_password(password: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            required_password: Some(password.into()),
            ..Self::default()
        })
    }

    /// Make subsequent connection attempts fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of connection closes.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of stores created.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Names of all existing stores, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let stores = lock(&self.stores);
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of a store's documents in insertion order.
    pub fn documents(&self, store: &str) -> Vec<Document> {
        let stores = lock(&self.stores);
        stores
            .get(store)
            .map(|data| read(data).documents.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            required_password: None,
            unreachable: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for Arc<MemoryServer> {
    type Connection = MemoryConnection;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MemoryConnection> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable {
                endpoint: descriptor.endpoint().to_string(),
                reason: "connection refused".into(),
            });
        }
        if let Some(required) = &self.required_password {
            if descriptor.password() != required {
                return Err(StoreError::AuthenticationFailed(descriptor.user().to_string()));
            }
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = descriptor.endpoint(), "memory store connected");

        Ok(MemoryConnection {
            server: Arc::clone(self),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A session to a [`MemoryServer`].
pub struct MemoryConnection {
    server: Arc<MemoryServer>,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn handle(&self, name: &str, data: Arc<RwLock<StoreData>>) -> MemoryStore {
        MemoryStore {
            name: name.to_string(),
            data,
            closed: Arc::clone(&self.closed),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Store = MemoryStore;

    async fn store_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(lock(&self.server.stores).contains_key(name))
    }

    async fn create_store(&self, name: &str) -> Result<MemoryStore> {
        self.ensure_open()?;
        let mut stores = lock(&self.server.stores);
        if stores.contains_key(name) {
            return Err(StoreError::StoreExists(name.to_string()));
        }
        let data = Arc::new(RwLock::new(StoreData::default()));
        stores.insert(name.to_string(), Arc::clone(&data));
        self.server.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.handle(name, data))
    }

    async fn get_store(&self, name: &str) -> Result<MemoryStore> {
        self.ensure_open()?;
        let stores = lock(&self.server.stores);
        let data = stores
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::StoreNotFound(name.to_string()))?;
        Ok(self.handle(name, data))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A store handle on a [`MemoryServer`].
pub struct MemoryStore {
    name: String,
    data: Arc<RwLock<StoreData>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: &Document) -> Result<()> {
        self.ensure_open()?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {e}")))?;

        if data.index.contains_key(document.id()) {
            return Err(StoreError::DuplicateId {
                store: self.name.clone(),
                id: document.id().clone(),
            });
        }

        let position = data.documents.len();
        data.index.insert(document.id().clone(), position);
        data.documents.push(document.clone());
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.ensure_open()?;
        let data = read(&self.data);
        Ok(data.index.get(id).map(|&i| data.documents[i].clone()))
    }

    async fn count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(read(&self.data).documents.len())
    }

    async fn list_ids(&self) -> Result<Vec<DocumentId>> {
        self.ensure_open()?;
        Ok(read(&self.data)
            .documents
            .iter()
            .map(|d| d.id().clone())
            .collect())
    }
}

// Poisoning only happens if a holder panicked; the maps stay consistent
// because every mutation is a single push/insert.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}
