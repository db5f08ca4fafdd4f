//! Vault error types using thiserror 2.0.
//!
//! Errors carry enough of the HTTP status to tell a permission failure
//! (403) apart from transient unavailability.

use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unreachable
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Authentication failed or returned no usable token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Vault answered with a non-success status
    #[error("Error making API request.\n\nURL: {url}\nCode: {status}. Errors:\n\n{}", format_errors(.errors))]
    Api {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
        /// Error strings from the response body
        errors: Vec<String>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

fn format_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("* {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl VaultError {
    /// HTTP status reported by Vault, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether Vault refused the request for lack of privilege.
    ///
    /// Errors that reach us already flattened to text are matched on the
    /// `Code: 403` marker Vault's API errors carry.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.status() == Some(403) || self.to_string().contains("Code: 403")
    }

    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create an API error.
    #[must_use]
    pub fn api(status: u16, url: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Api {
            status,
            url: url.into(),
            errors,
        }
    }
}
