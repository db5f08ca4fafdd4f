//! Authenticated session.
//!
//! The session owns the credential behind a single guard: secret reads hold
//! it shared for the duration of the store call, renewal holds it
//! exclusively while it calls the store and swaps in the refreshed lease.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use vault_client::{Lease, Secret, SecretStore, VaultResult};

/// Bearer token plus its lease.
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    lease: Option<Lease>,
    issued_ttl: Option<Duration>,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub const fn new(token: SecretString, lease: Option<Lease>) -> Self {
        Self {
            token,
            lease,
            issued_ttl: None,
        }
    }

    /// Record the TTL the token was issued with.
    #[must_use]
    pub fn with_issued_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.issued_ttl = ttl;
        self
    }

    /// Bearer token.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Token lease; `None` for tokens that never expire.
    #[must_use]
    pub const fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// TTL the token was issued with, when Vault reported it.
    #[must_use]
    pub const fn issued_ttl(&self) -> Option<Duration> {
        self.issued_ttl
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("lease", &self.lease)
            .field("issued_ttl", &self.issued_ttl)
            .finish()
    }
}

/// Store handle plus the credential obtained from it.
pub struct AuthSession {
    store: Arc<dyn SecretStore>,
    method: &'static str,
    credential: RwLock<Credential>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("addr", &self.store.address())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Create a session.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, method: &'static str, credential: Credential) -> Self {
        Self {
            store,
            method,
            credential: RwLock::new(credential),
        }
    }

    /// Name of the method that produced this session.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Store address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.store.address()
    }

    /// Copy of the current credential.
    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }

    /// Current token lease.
    pub async fn lease(&self) -> Option<Lease> {
        self.credential.read().await.lease.clone()
    }

    /// Read `path` with the current token.
    ///
    /// # Errors
    ///
    /// Propagates the store error.
    pub async fn read(&self, path: &str) -> VaultResult<Option<Secret>> {
        let credential = self.credential.read().await;
        self.store.read(credential.token.expose_secret(), path).await
    }

    /// Renew the token by `increment` and adopt the returned lease.
    ///
    /// # Errors
    ///
    /// Propagates the store error; the credential is left untouched.
    pub async fn renew(&self, increment: Duration) -> VaultResult<Credential> {
        let mut credential = self.credential.write().await;
        let secret = self
            .store
            .renew_self(credential.token.expose_secret(), increment)
            .await?;

        let current = credential.token.expose_secret();
        if let Some(token) = secret.token_id().filter(|t| *t != current) {
            debug!("Renewal returned a new token");
            credential.token = SecretString::from(token.to_string());
        }
        credential.lease = secret.token_lease();

        Ok(credential.clone())
    }

    /// Revoke the token. Best effort: failure is logged and reported as
    /// `false`, never raised.
    pub async fn revoke_self(&self) -> bool {
        debug!("Revoking Vault token");
        let credential = self.credential.read().await;
        match self.store.revoke_self(credential.token.expose_secret()).await {
            Ok(()) => {
                info!(addr = %self.store.address(), "Vault token revoked");
                true
            }
            Err(e) => {
                error!(
                    addr = %self.store.address(),
                    error = %e,
                    "Failed to revoke Vault token. This will leave credentials around in Vault"
                );
                false
            }
        }
    }
}
