//! Durable client-side storage for the token and host-integration flags.
//!
//! The widget keeps exactly three durable values: one credential string and
//! two booleans. Everything else is page-lifetime state. `DurableStore` is
//! the seam; `FileStore` backs the terminal host and `MemoryStore` backs
//! tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::session::{Session, storage_keys};

/// Key/value storage that survives restarts.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a value. Absence is a normal steady state.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A JSON object on disk, cached in memory and written through on every change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// Open (or lazily create) the state file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).await?;
            if raw.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(StorageError::Corrupt {
                            path: path.display().to_string(),
                        });
                    }
                }
            }
        } else {
            Map::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn flush(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}

/// In-memory store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// The credential held by the session, mirrored into durable storage.
///
/// No format validation happens here; only the remote service decides
/// whether a token is valid.
#[derive(Clone)]
pub struct TokenStore {
    store: std::sync::Arc<dyn DurableStore>,
}

impl TokenStore {
    pub fn new(store: std::sync::Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Read the persisted token, if any.
    pub async fn load(&self) -> Result<Option<SecretString>, StorageError> {
        let value = self.store.get(storage_keys::TOKEN).await?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string())))
    }

    /// Restore the durable parts of a session: the token and both
    /// host-integration flags.
    pub async fn restore_session(&self) -> Result<Session, StorageError> {
        let token = self.load().await?;
        let prompted = read_flag(self.store.as_ref(), storage_keys::HOST_PROMPTED).await?;
        let declined = read_flag(self.store.as_ref(), storage_keys::HOST_DECLINED).await?;

        Ok(Session {
            token,
            has_prompted_for_host_integration: prompted,
            declined_host_integration: declined,
            ..Default::default()
        })
    }

    /// Current token of the session.
    pub fn get(session: &Session) -> Option<&SecretString> {
        session.token.as_ref()
    }

    /// Store a token in the session and persist it.
    ///
    /// The session is updated even when persistence fails.
    pub async fn set(&self, session: &mut Session, token: SecretString) -> Result<(), StorageError> {
        let raw = Value::String(token.expose_secret().to_string());
        session.token = Some(token);
        session.bump_epoch();
        self.store.set(storage_keys::TOKEN, raw).await
    }

    /// Drop the token from the session and from storage.
    pub async fn clear(&self, session: &mut Session) -> Result<(), StorageError> {
        session.token = None;
        session.bump_epoch();
        self.store.remove(storage_keys::TOKEN).await
    }
}

/// Persist both host-integration flags from the session.
pub async fn persist_host_flags(
    store: &dyn DurableStore,
    session: &Session,
) -> Result<(), StorageError> {
    store
        .set(
            storage_keys::HOST_PROMPTED,
            Value::Bool(session.has_prompted_for_host_integration),
        )
        .await?;
    store
        .set(
            storage_keys::HOST_DECLINED,
            Value::Bool(session.declined_host_integration),
        )
        .await
}

async fn read_flag(store: &dyn DurableStore, key: &str) -> Result<bool, StorageError> {
    Ok(store
        .get(key)
        .await?
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}
