//! Secret retrieval.
//!
//! Requests are fetched one at a time in configuration order and the first
//! failure aborts the batch, so callers either get every required secret
//! or none.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vault_client::Lease;

use crate::config::SecretRequest;
use crate::error::{SidecarError, SidecarResult};
use crate::lease::LeaseRegistry;
use crate::session::AuthSession;

/// A fetched secret.
#[derive(Clone, PartialEq)]
pub struct SecretRecord {
    /// Configured key
    pub key: String,
    /// Resolved Vault path
    pub path: String,
    /// Secret payload
    pub data: Map<String, Value>,
    /// Lease, absent for static values
    pub lease: Option<Lease>,
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("fields", &self.data.keys().collect::<Vec<_>>())
            .field("lease", &self.lease)
            .finish()
    }
}

/// Result of a fetch batch.
#[derive(Debug, Clone, Default)]
pub struct FetchedSecrets {
    /// Records by key
    pub records: BTreeMap<String, SecretRecord>,
    /// Keys omitted because they were empty and allowed to be
    pub skipped: Vec<String>,
}

impl FetchedSecrets {
    /// Record for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SecretRecord> {
        self.records.get(key)
    }

    /// Number of fetched secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Effective Vault path for `path`.
///
/// A path starting with `/` is used as given. Anything else is joined under
/// `prefix` (which may be empty) and cleaned: empty and `.` segments are
/// dropped and `..` removes the previous segment.
#[must_use]
pub fn resolve_path(prefix: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in prefix.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if prefix.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Reject request lists that reuse a key.
///
/// # Errors
///
/// Returns [`SidecarError::DuplicateSecretKey`] naming the first repeat.
pub fn ensure_unique_keys(requests: &[SecretRequest]) -> SidecarResult<()> {
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.key.as_str()) {
            return Err(SidecarError::DuplicateSecretKey(request.key.clone()));
        }
    }
    Ok(())
}

/// Fetches configured secrets through a session.
#[derive(Debug)]
pub struct SecretFetcher {
    prefix: String,
    registry: Arc<LeaseRegistry>,
}

impl SecretFetcher {
    /// Fetcher resolving relative paths under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, registry: Arc<LeaseRegistry>) -> Self {
        Self {
            prefix: prefix.into(),
            registry,
        }
    }

    /// Fetch every request.
    ///
    /// A path with nothing stored and a secret whose `data` is an empty
    /// object are both treated as missing: skipped when the request is
    /// missing-ok, fatal otherwise.
    ///
    /// Secret leases are persisted before the sidecar reports the secrets,
    /// so a lease file that cannot be written fails the fetch rather than
    /// leaving leases nobody tracks.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate key (before any read), on any store error, on a
    /// missing secret for a request that is not missing-ok, and when a lease
    /// cannot be persisted.
    pub async fn fetch(
        &self,
        session: &AuthSession,
        requests: &[SecretRequest],
    ) -> SidecarResult<FetchedSecrets> {
        ensure_unique_keys(requests)?;

        let mut fetched = FetchedSecrets::default();
        for request in requests {
            let path = resolve_path(&self.prefix, &request.path);
            debug!(key = %request.key, path = %path, "Fetching secret");

            let secret = session
                .read(&path)
                .await
                .map_err(|source| SidecarError::SecretFetch {
                    path: path.clone(),
                    addr: session.address().to_string(),
                    source,
                })?;

            let Some(secret) = secret.filter(|s| s.data.as_ref().is_some_and(|d| !d.is_empty()))
            else {
                if request.missing_ok {
                    warn!(key = %request.key, path = %path, "No secret found; skipping");
                    fetched.skipped.push(request.key.clone());
                    continue;
                }
                return Err(SidecarError::MissingSecret {
                    key: request.key.clone(),
                    path,
                });
            };

            let lease = secret.lease();
            if let Some(lease) = &lease {
                self.registry.enroll_secret(&request.key, lease).await?;
            }

            fetched.records.insert(
                request.key.clone(),
                SecretRecord {
                    key: request.key.clone(),
                    path,
                    data: secret.data.unwrap_or_default(),
                    lease,
                },
            );
        }

        info!(
            fetched = fetched.len(),
            skipped = fetched.skipped.len(),
            "Fetched secrets"
        );
        Ok(fetched)
    }
}
