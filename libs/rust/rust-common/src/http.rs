//! Centralized HTTP client configuration and building.
//!
//! Both the Vault client and the in-cluster Kubernetes client are built
//! here so timeouts and TLS settings stay consistent.

use reqwest::{Certificate, Client, ClientBuilder};
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Extra PEM-encoded root certificate to trust
    pub root_ca_pem: Option<Vec<u8>>,
    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("vault-sidecar/", env!("CARGO_PKG_VERSION")).to_string(),
            root_ca_pem: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Trust an additional PEM-encoded root certificate.
    #[must_use]
    pub fn with_root_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_ca_pem = Some(pem.into());
        self
    }

    /// Disable TLS certificate verification.
    #[must_use]
    pub const fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.accept_invalid_certs = insecure;
        self
    }
}

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns an error if the root certificate cannot be parsed or the client
/// cannot be built (e.g., TLS initialization fails).
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_timeout(Duration::from_secs(60));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .use_rustls_tls();

    if let Some(pem) = &config.root_ca_pem {
        builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
    }

    builder.build()
}
