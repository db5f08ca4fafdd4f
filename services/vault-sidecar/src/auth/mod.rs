//! Authentication chain.
//!
//! Methods are tried in a fixed priority order. A method that is not
//! configured reports [`AuthOutcome::NotApplicable`] and the next one is
//! tried; the first method that *is* configured settles the outcome, so a
//! failure there is fatal rather than a fall-through.

mod kubernetes;
mod platform;
mod token;

pub use kubernetes::KubernetesAuth;
pub use platform::ConfigMapTokenAuth;
pub use token::{LeaseTokenAuth, StaticTokenAuth};

use async_trait::async_trait;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use vault_client::SecretStore;

use crate::error::{SidecarError, SidecarResult};
use crate::lease::LeaseRegistry;
use crate::platform::PlatformClient;
use crate::session::{AuthSession, Credential};

/// Default namespace searched for the token ConfigMap.
pub const DEFAULT_CONFIGMAP_NAMESPACE: &str = "default";
/// Default name of the token ConfigMap.
pub const DEFAULT_CONFIGMAP_NAME: &str = "vault-token";

/// Result of trying one method.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The method is not configured; try the next one.
    NotApplicable,
    /// The method is configured and failed.
    Failed(SidecarError),
    /// The method produced a credential.
    Authenticated(Credential),
}

/// One way of obtaining a Vault token.
#[async_trait]
pub trait AuthMethod: Send + Sync {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Try to authenticate against `store`.
    async fn attempt(&self, store: &dyn SecretStore) -> AuthOutcome;
}

/// Inputs for the standard chain.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Token passed on the command line
    pub cli_token: Option<SecretString>,
    /// Token from `VAULT_TOKEN`
    pub env_token: Option<SecretString>,
    /// Role for service-account login; unset disables it
    pub k8s_role: Option<String>,
    /// Auth mount for service-account login
    pub k8s_login_path: String,
    /// Service-account token file
    pub service_account_token: PathBuf,
    /// Namespace of the token ConfigMap
    pub configmap_namespace: String,
    /// Name of the token ConfigMap
    pub configmap_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cli_token: None,
            env_token: None,
            k8s_role: None,
            k8s_login_path: "kubernetes".to_string(),
            service_account_token: PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/token",
            ),
            configmap_namespace: DEFAULT_CONFIGMAP_NAMESPACE.to_string(),
            configmap_name: DEFAULT_CONFIGMAP_NAME.to_string(),
        }
    }
}

/// Ordered authentication chain.
pub struct AuthResolver {
    methods: Vec<Box<dyn AuthMethod>>,
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("methods", &self.method_names())
            .finish()
    }
}

impl AuthResolver {
    /// Chain trying `methods` in order.
    #[must_use]
    pub fn new(methods: Vec<Box<dyn AuthMethod>>) -> Self {
        Self { methods }
    }

    /// The standard chain: persisted token, command-line token,
    /// `VAULT_TOKEN`, token ConfigMap, service-account login.
    #[must_use]
    pub fn standard(
        settings: &AuthSettings,
        registry: Arc<LeaseRegistry>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self::new(vec![
            Box::new(LeaseTokenAuth::new(registry)),
            Box::new(StaticTokenAuth::command_line(settings.cli_token.clone())),
            Box::new(StaticTokenAuth::environment(settings.env_token.clone())),
            Box::new(ConfigMapTokenAuth::new(
                platform,
                settings.configmap_namespace.clone(),
                settings.configmap_name.clone(),
            )),
            Box::new(KubernetesAuth::new(
                settings.k8s_role.clone(),
                settings.k8s_login_path.clone(),
                settings.service_account_token.clone(),
            )),
        ])
    }

    /// Method names in priority order.
    #[must_use]
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    /// Run the chain and open a session with the first configured method.
    ///
    /// # Errors
    ///
    /// Returns the configured method's failure, or
    /// [`SidecarError::NoAuthMethod`] when no method applies.
    pub async fn resolve(&self, store: Arc<dyn SecretStore>) -> SidecarResult<AuthSession> {
        for method in &self.methods {
            match method.attempt(store.as_ref()).await {
                AuthOutcome::NotApplicable => {
                    debug!(method = method.name(), "Authentication method not applicable");
                }
                AuthOutcome::Failed(e) => return Err(e),
                AuthOutcome::Authenticated(credential) => {
                    info!(
                        method = method.name(),
                        addr = %store.address(),
                        renewable = credential.lease().is_some_and(|l| l.renewable),
                        "Authenticated to Vault"
                    );
                    return Ok(AuthSession::new(store, method.name(), credential));
                }
            }
        }
        Err(SidecarError::NoAuthMethod)
    }
}
