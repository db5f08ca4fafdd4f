//! Kubernetes service-account login.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;
use vault_client::{SecretStore, VaultError};

use super::{AuthMethod, AuthOutcome};
use crate::error::SidecarError;
use crate::session::Credential;

/// Exchange the pod's service-account JWT for a Vault token.
#[derive(Debug, Clone)]
pub struct KubernetesAuth {
    role: Option<String>,
    login_path: String,
    token_path: PathBuf,
}

impl KubernetesAuth {
    /// Login as `role` against `auth/<login_path>/login`; `None` disables
    /// the method.
    #[must_use]
    pub fn new(role: Option<String>, login_path: impl Into<String>, token_path: PathBuf) -> Self {
        Self {
            role: role.filter(|r| !r.is_empty()),
            login_path: login_path.into(),
            token_path,
        }
    }

    fn failed(&self, store: &dyn SecretStore, source: VaultError) -> AuthOutcome {
        AuthOutcome::Failed(SidecarError::Authentication {
            method: self.name(),
            addr: store.address().to_string(),
            source,
        })
    }
}

#[async_trait]
impl AuthMethod for KubernetesAuth {
    fn name(&self) -> &'static str {
        "kubernetes service account"
    }

    async fn attempt(&self, store: &dyn SecretStore) -> AuthOutcome {
        let Some(role) = &self.role else {
            return AuthOutcome::NotApplicable;
        };

        let jwt = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(jwt) => jwt,
            Err(source) => {
                return AuthOutcome::Failed(SidecarError::IdentityToken {
                    path: self.token_path.display().to_string(),
                    source,
                });
            }
        };

        debug!(role = %role, mount = %self.login_path, "Logging in with service account");
        let payload = json!({ "jwt": jwt.trim(), "role": role });
        let response = match store.login(&self.login_path, payload).await {
            Ok(response) => response,
            Err(e) => return self.failed(store, e),
        };

        match response.token_id() {
            Some(token) => AuthOutcome::Authenticated(
                Credential::new(SecretString::from(token.to_string()), response.token_lease())
                    .with_issued_ttl(response.token_creation_ttl()),
            ),
            None => self.failed(
                store,
                VaultError::auth_failed("login response did not include a client token"),
            ),
        }
    }
}
