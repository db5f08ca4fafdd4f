//! Vault client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default Vault address, matching the Vault CLI.
pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Request timeout
    pub timeout: Duration,
    /// PEM bundle used to verify the server certificate
    pub ca_cert: Option<PathBuf>,
    /// Skip TLS verification
    pub skip_verify: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VAULT_ADDR.to_string(),
            timeout: Duration::from_secs(60),
            ca_cert: None,
            skip_verify: false,
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trust the CA bundle at `path`.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Skip TLS verification.
    #[must_use]
    pub const fn with_skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = skip;
        self
    }
}
