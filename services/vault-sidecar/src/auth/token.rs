//! Token-based methods: the token is already known and only needs to be
//! validated with a self-lookup.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::debug;
use vault_client::SecretStore;

use super::{AuthMethod, AuthOutcome};
use crate::error::SidecarError;
use crate::lease::LeaseRegistry;
use crate::session::Credential;

/// Confirm `token` is live and pick up its lease.
pub(crate) async fn validate_token(
    method: &'static str,
    store: &dyn SecretStore,
    token: SecretString,
) -> AuthOutcome {
    debug!(method, "Validating token with lookup-self");
    match store.lookup_self(token.expose_secret()).await {
        Ok(metadata) => AuthOutcome::Authenticated(
            Credential::new(token, metadata.token_lease())
                .with_issued_ttl(metadata.token_creation_ttl()),
        ),
        Err(source) => AuthOutcome::Failed(SidecarError::Authentication {
            method,
            addr: store.address().to_string(),
            source,
        }),
    }
}

/// Token persisted in the lease file by a previous run.
#[derive(Debug)]
pub struct LeaseTokenAuth {
    registry: Arc<LeaseRegistry>,
}

impl LeaseTokenAuth {
    /// Method reading the token from `registry`.
    #[must_use]
    pub const fn new(registry: Arc<LeaseRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl AuthMethod for LeaseTokenAuth {
    fn name(&self) -> &'static str {
        "lease file token"
    }

    async fn attempt(&self, store: &dyn SecretStore) -> AuthOutcome {
        match self.registry.auth_token().await {
            Some(token) => validate_token(self.name(), store, token).await,
            None => AuthOutcome::NotApplicable,
        }
    }
}

/// Token supplied directly through configuration.
#[derive(Debug)]
pub struct StaticTokenAuth {
    name: &'static str,
    token: Option<SecretString>,
}

impl StaticTokenAuth {
    /// Token given with `--vault-token`.
    #[must_use]
    pub fn command_line(token: Option<SecretString>) -> Self {
        Self::new("command line token", token)
    }

    /// Token from the `VAULT_TOKEN` environment variable.
    #[must_use]
    pub fn environment(token: Option<SecretString>) -> Self {
        Self::new("VAULT_TOKEN", token)
    }

    fn new(name: &'static str, token: Option<SecretString>) -> Self {
        Self {
            name,
            token: token.filter(|t| !t.expose_secret().is_empty()),
        }
    }
}

#[async_trait]
impl AuthMethod for StaticTokenAuth {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn attempt(&self, store: &dyn SecretStore) -> AuthOutcome {
        match &self.token {
            Some(token) => validate_token(self.name, store, token.clone()).await,
            None => AuthOutcome::NotApplicable,
        }
    }
}
