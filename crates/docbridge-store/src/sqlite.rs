//! SQLite implementation of the store gateway.
//!
//! This is the primary storage backend. The descriptor's endpoint names the
//! database file (or `:memory:`). It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.
//!
//! Credentials are checked against the `principals` table: the first
//! connection for a user registers a keyed Blake3 digest of its password,
//! later connections must present the same password.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docbridge_core::{ConnectionDescriptor, Document, DocumentId, Payload};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::traits::{Connection, Connector, DocumentStore};

/// Key-derivation context for password digests.
const PASSWORD_CONTEXT: &str = "docbridge 2024-01-01 principal password v1";

/// The underlying handle. `None` once the connection has been closed.
type SharedConn = Arc<Mutex<Option<rusqlite::Connection>>>;

/// Opens [`SqliteConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<SqliteConnection> {
        let descriptor = descriptor.clone();

        tokio::task::spawn_blocking(move || SqliteConnection::open(&descriptor))
            .await
            .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {e}")))?
    }
}

/// A session to a SQLite database.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteConnection {
    endpoint: String,
    conn: SharedConn,
}

impl SqliteConnection {
    /// Open and authenticate synchronously.
    pub fn open(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = descriptor.endpoint();
        if descriptor.ssl() {
            warn!(endpoint, "ssl requested but not applicable to a local SQLite endpoint");
        }

        let opened = if endpoint == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(Path::new(endpoint))
        };
        let mut conn = opened.map_err(|e| StoreError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        migration::migrate(&mut conn)?;
        authenticate(&conn, descriptor.user(), descriptor.password())?;

        debug!(endpoint, user = descriptor.user(), "sqlite connection opened");

        Ok(Self {
            endpoint: endpoint.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// The endpoint this connection was opened on.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn handle(&self, name: &str) -> SqliteStore {
        SqliteStore {
            name: name.to_string(),
            conn: Arc::clone(&self.conn),
        }
    }
}

fn password_digest(user: &str, password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(user.as_bytes());
    hasher.update(&[0]);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

fn authenticate(conn: &rusqlite::Connection, user: &str, password: &str) -> Result<()> {
    let digest = password_digest(user, password);

    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT password_digest FROM principals WHERE user = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO principals (user, password_digest, created_at) VALUES (?1, ?2, ?3)",
                params![user, digest.as_bytes().as_slice(), now_millis()],
            )?;
            info!(user, "registered new principal");
            Ok(())
        }
        Some(bytes) => {
            let stored: [u8; 32] = bytes
                .try_into()
                .map_err(|_| StoreError::Internal(format!("corrupt password digest for {user}")))?;
            // blake3::Hash equality is constant time.
            if blake3::Hash::from(stored) == digest {
                Ok(())
            } else {
                Err(StoreError::AuthenticationFailed(user.to_string()))
            }
        }
    }
}

/// Run `f` against the live connection on the blocking pool.
async fn blocking<F, T>(conn: &SharedConn, f: F) -> Result<T>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);

    tokio::task::spawn_blocking(move || {
        let mut guard = conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("mutex poisoned: {e}")))?;
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        f(conn)
    })
    .await
    .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {e}")))?
}

fn store_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[async_trait]
impl Connection for SqliteConnection {
    type Store = SqliteStore;

    async fn store_exists(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        blocking(&self.conn, move |conn| store_exists(conn, &name)).await
    }

    async fn create_store(&self, name: &str) -> Result<SqliteStore> {
        let owned = name.to_string();
        blocking(&self.conn, move |conn| {
            if store_exists(conn, &owned)? {
                return Err(StoreError::StoreExists(owned));
            }
            conn.execute(
                "INSERT INTO stores (name, created_at) VALUES (?1, ?2)",
                params![owned, now_millis()],
            )?;
            Ok(())
        })
        .await?;

        Ok(self.handle(name))
    }

    async fn get_store(&self, name: &str) -> Result<SqliteStore> {
        let owned = name.to_string();
        blocking(&self.conn, move |conn| {
            if store_exists(conn, &owned)? {
                Ok(())
            } else {
                Err(StoreError::StoreNotFound(owned))
            }
        })
        .await?;

        Ok(self.handle(name))
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let endpoint = self.endpoint.clone();

        tokio::task::spawn_blocking(move || {
            let taken = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("mutex poisoned: {e}")))?
                .take()
                .ok_or(StoreError::Closed)?;
            taken
                .close()
                .map_err(|(_, e)| StoreError::Database(e))?;
            debug!(endpoint = %endpoint, "sqlite connection closed");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {e}")))?
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// A store handle backed by the `documents` table.
pub struct SqliteStore {
    name: String,
    conn: SharedConn,
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: &Document) -> Result<()> {
        let store = self.name.clone();
        let document = document.clone();

        blocking(&self.conn, move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT rowid FROM documents WHERE store = ?1 AND doc_id = ?2",
                    params![store, document.id().as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                return Err(StoreError::DuplicateId {
                    store,
                    id: document.id().clone(),
                });
            }

            conn.execute(
                "INSERT INTO documents (store, doc_id, body, inserted_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    store,
                    document.id().as_str(),
                    document.body().as_ref(),
                    now_millis(),
                ],
            )?;

            debug!(store = %store, id = %document.id(), bytes = document.len(), "document inserted");
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        let store = self.name.clone();
        let id = id.clone();

        blocking(&self.conn, move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM documents WHERE store = ?1 AND doc_id = ?2",
                    params![store, id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(body.map(|body| Document::new(id, Payload::from(body))))
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        let store = self.name.clone();

        blocking(&self.conn, move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE store = ?1",
                params![store],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn list_ids(&self) -> Result<Vec<DocumentId>> {
        let store = self.name.clone();

        blocking(&self.conn, move |conn| {
            let mut stmt =
                conn.prepare("SELECT doc_id FROM documents WHERE store = ?1 ORDER BY rowid")?;

            let ids = stmt
                .query_map(params![store], |row| row.get::<_, String>(0))?
                .map(|id| id.map(DocumentId::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(ids)
        })
        .await
    }
}
