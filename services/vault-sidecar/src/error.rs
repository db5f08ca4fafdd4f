//! Sidecar error taxonomy.
//!
//! Every fatal condition surfaces as a [`SidecarError`] returned up to
//! `main`, which is the only place that decides to exit.

use thiserror::Error;
use vault_client::VaultError;

use crate::lease::LeaseStoreError;

/// Sidecar errors.
#[derive(Error, Debug)]
pub enum SidecarError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two secret requests share a key
    #[error("Duplicate secret key {0:?}")]
    DuplicateSecretKey(String),

    /// No authentication method applies
    #[error("No authentication mechanism specified and VAULT_TOKEN is not set")]
    NoAuthMethod,

    /// A configured authentication method failed
    #[error("Failed to authenticate to {addr} using {method}: {source}")]
    Authentication {
        /// Method that was attempted
        method: &'static str,
        /// Vault address
        addr: String,
        /// Underlying failure
        #[source]
        source: VaultError,
    },

    /// Reading the identity token file failed
    #[error("Failed to read service account token {path}: {source}")]
    IdentityToken {
        /// Token file path
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The credential may no longer renew itself
    #[error("Permission denied renewing the Vault token; the token was likely revoked: {0}")]
    PermissionDenied(#[source] VaultError),

    /// Renewal kept failing until the window closed
    #[error("Vault token renewal timed out after {attempts} attempts: {source}")]
    RenewalTimedOut {
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: VaultError,
    },

    /// A non-renewable lease was handed to the renewer
    #[error("Lease {0:?} is not renewable")]
    NotRenewable(String),

    /// Operation cancelled by shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// A background task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// The store call for a secret failed
    #[error("Error fetching secret {path:?} from {addr}: {source}")]
    SecretFetch {
        /// Resolved path
        path: String,
        /// Vault address
        addr: String,
        /// Underlying failure
        #[source]
        source: VaultError,
    },

    /// A required secret was empty
    #[error("No secret returned for key {key:?} at {path:?}")]
    MissingSecret {
        /// Secret key
        key: String,
        /// Resolved path
        path: String,
    },

    /// Lease persistence failed
    #[error("Lease file error: {0}")]
    LeaseFile(#[from] LeaseStoreError),

    /// Writing the secrets output failed
    #[error("Failed to write secrets to {path}: {source}")]
    Output {
        /// Output path
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Vault client construction or transport error outside the cases above
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Result type for sidecar operations.
pub type SidecarResult<T> = Result<T, SidecarError>;

impl SidecarError {
    /// Whether the store rejected the credential (revoked or under-privileged).
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::Authentication { source, .. } | Self::SecretFetch { source, .. } => {
                source.is_permission_denied()
            }
            _ => false,
        }
    }

    /// Whether renewal gave up because the store stayed unreachable.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::RenewalTimedOut { .. })
    }

    /// Whether the error is a configuration problem rather than a runtime
    /// failure.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::DuplicateSecretKey(_) | Self::NoAuthMethod | Self::NotRenewable(_)
        )
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
