//! Store handles: one libSQL database plus its single shared connection

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use tokio::sync::Mutex;

use super::migrations;
use crate::error::{Error, Result};
use crate::monitor::RemoteProbe;

/// Which side of the replication pair a store plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// Always-available source of truth on this machine
    Local,
    /// Shared server store, reachable only some of the time
    Remote,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Connection settings for the remote store
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Remote database URL (e.g., `libsql://tasker.example.com`)
    pub url: String,
    /// Authentication token for the remote database
    pub auth_token: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Cloneable handle to one store.
///
/// Every operation locks the shared connection for its whole statement
/// sequence, so two logical operations never interleave on the same handle.
#[derive(Clone)]
pub struct Store {
    db: Arc<LibSqlDatabase>,
    conn: Arc<Mutex<Connection>>,
    role: StoreRole,
}

impl Store {
    /// Open the local store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path_str = path.to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::from_database(db, StoreRole::Local).await
    }

    /// Open an in-memory store (useful for testing either role)
    pub async fn open_in_memory(role: StoreRole) -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_database(db, role).await
    }

    /// Connect to the remote store and bring its schema up to date
    pub async fn open_remote(config: &RemoteConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::InvalidInput("Remote URL is required".into()));
        }
        let db = Builder::new_remote(config.url.clone(), config.auth_token.clone())
            .build()
            .await?;
        tracing::debug!("Connected to remote store at {}", config.url);
        Self::from_database(db, StoreRole::Remote).await
    }

    async fn from_database(db: LibSqlDatabase, role: StoreRole) -> Result<Self> {
        let conn = db.connect()?;
        let store = Self {
            db: Arc::new(db),
            conn: Arc::new(Mutex::new(conn)),
            role,
        };
        store.configure().await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Configure `SQLite` pragmas
    async fn configure(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        // Some pragmas are rejected by remote servers; those are best effort
        conn.execute("PRAGMA journal_mode = WAL;", ()).await.ok();
        conn.execute("PRAGMA synchronous = NORMAL;", ()).await.ok();
        if let Err(error) = conn.execute("PRAGMA foreign_keys = ON;", ()).await {
            if self.role == StoreRole::Local {
                return Err(error.into());
            }
            tracing::debug!("Remote store rejected foreign_keys pragma: {error}");
        }
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        migrations::run(&conn).await
    }

    /// Open a fresh connection, run a trivial query and drop it.
    pub async fn probe_connection(&self) -> Result<()> {
        let conn = self.db.connect()?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }

    pub const fn role(&self) -> StoreRole {
        self.role
    }

    /// Lock the shared connection for one logical operation
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Store")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteProbe for Store {
    async fn ping(&self) -> bool {
        match self.probe_connection().await {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!("{} store probe failed: {error}", self.role);
                false
            }
        }
    }
}
