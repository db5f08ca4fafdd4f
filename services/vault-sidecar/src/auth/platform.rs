//! Token published in a cluster ConfigMap.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, warn};
use vault_client::SecretStore;

use super::token::validate_token;
use super::{AuthMethod, AuthOutcome};
use crate::platform::PlatformClient;

const TOKEN_FIELD: &str = "token";

/// Token read from a uniquely-named ConfigMap.
///
/// Any problem finding the ConfigMap (not in a cluster, API error, no match,
/// several matches, no `token` field) makes the method inapplicable. Only a
/// token that is found and then rejected by Vault is fatal.
pub struct ConfigMapTokenAuth {
    platform: Arc<dyn PlatformClient>,
    namespace: String,
    name: String,
}

impl std::fmt::Debug for ConfigMapTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapTokenAuth")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ConfigMapTokenAuth {
    /// Method looking for ConfigMap `name` in `namespace`.
    #[must_use]
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl AuthMethod for ConfigMapTokenAuth {
    fn name(&self) -> &'static str {
        "vault-token ConfigMap"
    }

    async fn attempt(&self, store: &dyn SecretStore) -> AuthOutcome {
        let records = match self.platform.config_maps(&self.namespace, &self.name).await {
            Ok(records) => records,
            Err(e) => {
                debug!(
                    namespace = %self.namespace,
                    name = %self.name,
                    error = %e,
                    "Skipping ConfigMap token lookup"
                );
                return AuthOutcome::NotApplicable;
            }
        };

        let record = match records.as_slice() {
            [] => return AuthOutcome::NotApplicable,
            [record] => record,
            _ => {
                warn!(
                    namespace = %self.namespace,
                    name = %self.name,
                    count = records.len(),
                    "Found more than one token ConfigMap; ignoring them"
                );
                return AuthOutcome::NotApplicable;
            }
        };

        match record.get(TOKEN_FIELD).filter(|t| !t.is_empty()) {
            Some(token) => {
                validate_token(self.name(), store, SecretString::from(token.to_string())).await
            }
            None => {
                debug!(name = %record.name, "ConfigMap has no token field");
                AuthOutcome::NotApplicable
            }
        }
    }
}
