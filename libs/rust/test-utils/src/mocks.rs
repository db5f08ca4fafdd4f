//! Mock implementations for testing.
//!
//! [`MockSecretStore`] scripts the responses of every secret-store call and
//! records the calls it receives, so tests can assert both outcome and
//! traffic.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use vault_client::{Secret, SecretStore, VaultError, VaultResult};

/// Address reported by the mock store.
pub const MOCK_ADDRESS: &str = "http://vault.mock:8200";

/// A call received by the mock store. Tokens are recorded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `login(mount, payload)`
    Login {
        /// Auth mount
        mount: String,
        /// Request payload
        payload: Value,
    },
    /// `lookup_self(token)`
    LookupSelf {
        /// Presented token
        token: String,
    },
    /// `renew_self(token, increment)`
    RenewSelf {
        /// Presented token
        token: String,
        /// Requested increment
        increment: Duration,
    },
    /// `revoke_self(token)`
    RevokeSelf {
        /// Presented token
        token: String,
    },
    /// `read(token, path)`
    Read {
        /// Presented token
        token: String,
        /// Requested path
        path: String,
    },
}

/// Scripted outcome of a mock call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this response
    Respond(Secret),
    /// Return "nothing stored" (reads only)
    Empty,
    /// Fail with an API error carrying this status
    Status(u16),
    /// Fail as if the server were unreachable
    Unavailable,
}

impl Scripted {
    fn error(&self, url: &str) -> VaultError {
        match self {
            Self::Status(status) => {
                VaultError::api(*status, url, vec![format!("mock status {status}")])
            }
            _ => VaultError::unavailable("mock store unreachable"),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<StoreCall>,
    valid_tokens: HashMap<String, Secret>,
    logins: HashMap<String, Scripted>,
    reads: HashMap<String, Scripted>,
    renewals: VecDeque<Scripted>,
    renew_fallback: Option<Scripted>,
    revoke: Option<Scripted>,
}

/// Mock secret store for testing.
#[derive(Debug, Default, Clone)]
pub struct MockSecretStore {
    state: Arc<RwLock<State>>,
}

impl MockSecretStore {
    /// Create an empty mock store: every call fails until scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` on `lookup_self`, answering with `metadata`.
    pub async fn accept_token(&self, token: &str, metadata: Secret) {
        self.state
            .write()
            .await
            .valid_tokens
            .insert(token.to_string(), metadata);
    }

    /// Script the outcome of `login` against `mount`.
    pub async fn on_login(&self, mount: &str, outcome: Scripted) {
        self.state.write().await.logins.insert(mount.to_string(), outcome);
    }

    /// Script the outcome of reading `path` (matched after trimming a
    /// leading slash).
    pub async fn on_read(&self, path: &str, outcome: Scripted) {
        self.state
            .write()
            .await
            .reads
            .insert(path.trim_start_matches('/').to_string(), outcome);
    }

    /// Queue renewal outcomes, consumed in order.
    pub async fn queue_renewals(&self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.state.write().await.renewals.extend(outcomes);
    }

    /// Outcome used once the renewal queue is empty.
    pub async fn on_renew(&self, outcome: Scripted) {
        self.state.write().await.renew_fallback = Some(outcome);
    }

    /// Script the outcome of `revoke_self`; succeeds by default.
    pub async fn on_revoke(&self, outcome: Scripted) {
        self.state.write().await.revoke = Some(outcome);
    }

    /// All calls received so far.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    /// Number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.state.read().await.calls.len()
    }

    /// Number of `renew_self` calls received so far.
    pub async fn renew_count(&self) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::RenewSelf { .. }))
            .count()
    }

    /// Paths passed to `read`, in order.
    pub async fn read_paths(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Read { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: StoreCall) {
        self.state.write().await.calls.push(call);
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    fn address(&self) -> &str {
        MOCK_ADDRESS
    }

    async fn login(&self, mount: &str, payload: Value) -> VaultResult<Secret> {
        self.record(StoreCall::Login {
            mount: mount.to_string(),
            payload,
        })
        .await;

        let url = format!("{MOCK_ADDRESS}/v1/auth/{mount}/login");
        match self.state.read().await.logins.get(mount) {
            Some(Scripted::Respond(secret)) => Ok(secret.clone()),
            Some(Scripted::Empty) => Err(VaultError::auth_failed("empty login response")),
            Some(other) => Err(other.error(&url)),
            None => Err(VaultError::api(400, url, vec!["no handler for route".to_string()])),
        }
    }

    async fn lookup_self(&self, token: &str) -> VaultResult<Secret> {
        self.record(StoreCall::LookupSelf {
            token: token.to_string(),
        })
        .await;

        self.state
            .read()
            .await
            .valid_tokens
            .get(token)
            .cloned()
            .ok_or_else(|| {
                VaultError::api(
                    403,
                    format!("{MOCK_ADDRESS}/v1/auth/token/lookup-self"),
                    vec!["permission denied".to_string()],
                )
            })
    }

    async fn renew_self(&self, token: &str, increment: Duration) -> VaultResult<Secret> {
        self.record(StoreCall::RenewSelf {
            token: token.to_string(),
            increment,
        })
        .await;

        let outcome = {
            let mut state = self.state.write().await;
            let queued = state.renewals.pop_front();
            queued
                .or_else(|| state.renew_fallback.clone())
                .unwrap_or(Scripted::Unavailable)
        };

        match outcome {
            Scripted::Respond(secret) => Ok(secret),
            other => Err(other.error(&format!("{MOCK_ADDRESS}/v1/auth/token/renew-self"))),
        }
    }

    async fn revoke_self(&self, token: &str) -> VaultResult<()> {
        self.record(StoreCall::RevokeSelf {
            token: token.to_string(),
        })
        .await;

        match self.state.read().await.revoke.clone() {
            None | Some(Scripted::Respond(_) | Scripted::Empty) => Ok(()),
            Some(other) => Err(other.error(&format!("{MOCK_ADDRESS}/v1/auth/token/revoke-self"))),
        }
    }

    async fn read(&self, token: &str, path: &str) -> VaultResult<Option<Secret>> {
        self.record(StoreCall::Read {
            token: token.to_string(),
            path: path.to_string(),
        })
        .await;

        let key = path.trim_start_matches('/');
        match self.state.read().await.reads.get(key) {
            Some(Scripted::Respond(secret)) => Ok(Some(secret.clone())),
            Some(Scripted::Empty) | None => Ok(None),
            Some(other) => Err(other.error(&format!("{MOCK_ADDRESS}/v1/{key}"))),
        }
    }
}
