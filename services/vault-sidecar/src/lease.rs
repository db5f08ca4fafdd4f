//! Lease registry and its persistence.
//!
//! The registry is created once per process and shared by reference with
//! the resolver, renewer and fetcher. Every update is written through to the
//! configured [`LeaseStore`] while the registry's write guard is held, so a
//! concurrent [`LeaseRegistry::flush`] never persists a half-applied change.
//!
//! A failed write still leaves the update applied in memory. Bootstrap
//! callers propagate the error; the renewal loop logs it and leaves the
//! report to the final flush.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use vault_client::Lease;

use crate::output::write_private_file;

/// Lease persistence errors.
#[derive(Error, Debug)]
pub enum LeaseStoreError {
    /// Reading or writing the lease file failed
    #[error("{path}: {source}")]
    Io {
        /// Lease file path
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The lease file is not valid JSON
    #[error("{path}: {source}")]
    Parse {
        /// Lease file path
        path: String,
        /// Underlying failure
        #[source]
        source: serde_json::Error,
    },
}

/// What a lease belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaseCategory {
    /// The sidecar's own Vault token
    AuthToken,
    /// A fetched secret, by configured key
    Secret(String),
}

/// Persisted form of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Lease identifier
    #[serde(default)]
    pub lease_id: String,
    /// TTL in seconds when last (re)obtained
    #[serde(default)]
    pub ttl_secs: u64,
    /// Whether the lease is renewable
    #[serde(default)]
    pub renewable: bool,
    /// When the lease was last (re)obtained
    pub updated_at: DateTime<Utc>,
}

impl LeaseRecord {
    fn from_lease(lease: &Lease) -> Self {
        Self {
            lease_id: lease.id.clone(),
            ttl_secs: lease.ttl.as_secs(),
            renewable: lease.renewable,
            updated_at: Utc::now(),
        }
    }

    /// Convert back into a lease.
    #[must_use]
    pub fn to_lease(&self) -> Lease {
        Lease::new(self.lease_id.clone(), Duration::from_secs(self.ttl_secs), self.renewable)
    }
}

/// Persisted auth token and its lease.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenLease {
    /// Token value; empty when none is recorded
    #[serde(default)]
    pub token: String,
    /// Token lease, absent for tokens without a TTL
    #[serde(default)]
    pub lease: Option<LeaseRecord>,
}

impl fmt::Debug for AuthTokenLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("AuthTokenLease")
            .field("token", &token)
            .field("lease", &self.lease)
            .finish()
    }
}

/// Everything the registry knows, in its persisted shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSnapshot {
    /// The auth token lease
    #[serde(default)]
    pub auth_token: AuthTokenLease,
    /// Secret leases by key
    #[serde(default)]
    pub secrets: BTreeMap<String, LeaseRecord>,
}

/// Persistence collaborator for the registry.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Load the previously persisted snapshot, if any.
    async fn load(&self) -> Result<Option<LeaseSnapshot>, LeaseStoreError>;

    /// Replace the persisted snapshot.
    async fn save(&self, snapshot: &LeaseSnapshot) -> Result<(), LeaseStoreError>;
}

/// JSON lease file.
#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    path: PathBuf,
}

impl FileLeaseStore {
    /// Lease file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LeaseStoreError {
        LeaseStoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl LeaseStore for FileLeaseStore {
    async fn load(&self) -> Result<Option<LeaseSnapshot>, LeaseStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LeaseStoreError::Parse {
                path: self.path.display().to_string(),
                source,
            })
    }

    async fn save(&self, snapshot: &LeaseSnapshot) -> Result<(), LeaseStoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| LeaseStoreError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        write_private_file(&self.path, &bytes)
            .await
            .map_err(|e| self.io_error(e))
    }
}

/// Current auth-token and secret leases.
pub struct LeaseRegistry {
    state: RwLock<LeaseSnapshot>,
    store: Option<Arc<dyn LeaseStore>>,
}

impl fmt::Debug for LeaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseRegistry")
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl LeaseRegistry {
    /// Registry with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_snapshot(LeaseSnapshot::default())
    }

    /// Registry seeded with `snapshot` and no persistence.
    #[must_use]
    pub fn with_snapshot(snapshot: LeaseSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            store: None,
        }
    }

    /// Registry seeded from `store`, writing every update back to it.
    ///
    /// # Errors
    ///
    /// Fails when the persisted snapshot exists but cannot be read.
    pub async fn load(store: Arc<dyn LeaseStore>) -> Result<Self, LeaseStoreError> {
        let snapshot = store.load().await?.unwrap_or_default();
        debug!(
            has_auth_token = !snapshot.auth_token.token.is_empty(),
            secrets = snapshot.secrets.len(),
            "Loaded lease snapshot"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            store: Some(store),
        })
    }

    /// Persisted auth token, if a non-empty one is recorded.
    pub async fn auth_token(&self) -> Option<SecretString> {
        let state = self.state.read().await;
        let token = &state.auth_token.token;
        (!token.is_empty()).then(|| SecretString::from(token.clone()))
    }

    /// Current lease for `category`.
    pub async fn lease(&self, category: &LeaseCategory) -> Option<Lease> {
        let state = self.state.read().await;
        match category {
            LeaseCategory::AuthToken => state.auth_token.lease.as_ref().map(LeaseRecord::to_lease),
            LeaseCategory::Secret(key) => state.secrets.get(key).map(LeaseRecord::to_lease),
        }
    }

    /// Record the auth token and its lease.
    ///
    /// # Errors
    ///
    /// Fails when the update cannot be persisted; the in-memory state is
    /// updated regardless.
    pub async fn enroll_auth_token(
        &self,
        token: &SecretString,
        lease: Option<&Lease>,
    ) -> Result<(), LeaseStoreError> {
        let mut state = self.state.write().await;
        state.auth_token = AuthTokenLease {
            token: token.expose_secret().to_string(),
            lease: lease.map(LeaseRecord::from_lease),
        };
        self.persist(&state).await
    }

    /// Record the lease of the secret fetched under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the update cannot be persisted; the in-memory state is
    /// updated regardless.
    pub async fn enroll_secret(&self, key: &str, lease: &Lease) -> Result<(), LeaseStoreError> {
        let mut state = self.state.write().await;
        state
            .secrets
            .insert(key.to_string(), LeaseRecord::from_lease(lease));
        self.persist(&state).await
    }

    /// Forget the auth token after revocation or a permanent failure.
    ///
    /// # Errors
    ///
    /// Fails when the update cannot be persisted.
    pub async fn discard_auth_token(&self) -> Result<(), LeaseStoreError> {
        let mut state = self.state.write().await;
        state.auth_token = AuthTokenLease::default();
        self.persist(&state).await
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> LeaseSnapshot {
        self.state.read().await.clone()
    }

    /// Write the current state to the store.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be persisted.
    pub async fn flush(&self) -> Result<(), LeaseStoreError> {
        let state = self.state.read().await;
        self.persist(&state).await
    }

    async fn persist(&self, snapshot: &LeaseSnapshot) -> Result<(), LeaseStoreError> {
        match &self.store {
            Some(store) => store.save(snapshot).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_token() {
        let registry = LeaseRegistry::in_memory();
        assert!(registry.auth_token().await.is_none());
        assert!(registry.lease(&LeaseCategory::AuthToken).await.is_none());
    }

    #[tokio::test]
    async fn test_enroll_and_discard_auth_token() {
        let registry = LeaseRegistry::in_memory();
        let lease = Lease::new("acc", Duration::from_secs(60), true);

        registry.enroll_auth_token(&token("s.one"), Some(&lease)).await.unwrap();
        assert_eq!(registry.auth_token().await.unwrap().expose_secret(), "s.one");
        assert_eq!(registry.lease(&LeaseCategory::AuthToken).await, Some(lease));

        registry.discard_auth_token().await.unwrap();
        assert!(registry.auth_token().await.is_none());
    }

    #[tokio::test]
    async fn test_secret_leases_by_key() {
        let registry = LeaseRegistry::in_memory();
        let lease = Lease::new("database/creds/ro/1", Duration::from_secs(3600), true);
        registry.enroll_secret("db", &lease).await.unwrap();

        assert_eq!(registry.lease(&LeaseCategory::Secret("db".into())).await, Some(lease));
        assert!(registry.lease(&LeaseCategory::Secret("other".into())).await.is_none());
    }

    #[test]
    fn test_snapshot_debug_redacts_token() {
        let snapshot = LeaseSnapshot {
            auth_token: AuthTokenLease {
                token: "s.secret-token".to_string(),
                lease: None,
            },
            secrets: BTreeMap::new(),
        };
        let debug = format!("{snapshot:?}");
        assert!(!debug.contains("s.secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLeaseStore::new(dir.path().join("leases.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leases.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = FileLeaseStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, LeaseStoreError::Parse { .. }));
    }
}
