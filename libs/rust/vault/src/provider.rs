//! Secret-store abstraction.
//!
//! Every call that needs authority takes the token explicitly so the owner
//! of the credential decides how access to it is serialized.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::VaultResult;
use crate::secrets::Secret;

/// RPC surface of the secret store used by the sidecar.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Server address, for log lines.
    fn address(&self) -> &str;

    /// Log in against the auth backend mounted at `auth/<mount>`.
    async fn login(&self, mount: &str, payload: Value) -> VaultResult<Secret>;

    /// Look up the token's own metadata.
    async fn lookup_self(&self, token: &str) -> VaultResult<Secret>;

    /// Extend the token's lease by `increment`.
    async fn renew_self(&self, token: &str, increment: Duration) -> VaultResult<Secret>;

    /// Revoke the token.
    async fn revoke_self(&self, token: &str) -> VaultResult<()>;

    /// Read a logical path. `Ok(None)` when there is nothing stored there.
    async fn read(&self, token: &str, path: &str) -> VaultResult<Option<Secret>>;
}
