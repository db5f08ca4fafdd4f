//! Sidecar configuration.
//!
//! Flags are parsed with clap; every flag that has a conventional Vault
//! environment variable also reads it. A `.env` file is loaded first so
//! local runs can keep settings next to the binary.

use clap::Parser;
use rust_common::{RetryConfig, TracingConfig};
use secrecy::SecretString;
use serde::Deserialize;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vault_client::VaultConfig;
use vault_client::config::DEFAULT_VAULT_ADDR;

use crate::auth::{AuthSettings, DEFAULT_CONFIGMAP_NAME, DEFAULT_CONFIGMAP_NAMESPACE};
use crate::error::{SidecarError, SidecarResult};
use crate::renewer::RenewalSettings;

const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// One secret to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretRequest {
    /// Key the secret is exposed under; unique per configuration
    pub key: String,
    /// Vault path, absolute when it starts with `/`
    pub path: String,
    /// Tolerate an empty result
    #[serde(default, rename = "missingOk", alias = "isMissingOk", alias = "missing_ok")]
    pub missing_ok: bool,
}

/// Secrets configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsFile {
    /// Requests in fetch order
    #[serde(default)]
    pub secrets: Vec<SecretRequest>,
}

/// Read the requests listed in the secrets file at `path`.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub async fn load_secret_requests(path: &Path) -> SidecarResult<Vec<SecretRequest>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SidecarError::config(format!("reading {}: {e}", path.display())))?;
    let file: SecretsFile = serde_json::from_slice(&bytes)
        .map_err(|e| SidecarError::config(format!("parsing {}: {e}", path.display())))?;
    Ok(file.secrets)
}

#[allow(clippy::unnecessary_wraps)]
fn parse_secret(value: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::from(value.to_string()))
}

/// Command-line configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "vault-sidecar")]
#[command(about = "Authenticate to Vault, fetch secrets and keep the token alive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    /// Vault server address
    #[arg(long, env = "VAULT_ADDR", default_value = DEFAULT_VAULT_ADDR)]
    pub vault_addr: String,

    /// PEM bundle used to verify the Vault server certificate
    #[arg(long, env = "VAULT_CACERT")]
    pub vault_ca_cert: Option<PathBuf>,

    /// Skip Vault TLS verification
    #[arg(long, env = "VAULT_SKIP_VERIFY")]
    pub vault_skip_verify: bool,

    /// Timeout for Vault requests
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub vault_timeout: Duration,

    /// Vault token; takes precedence over VAULT_TOKEN
    #[arg(long, value_parser = parse_secret)]
    pub vault_token: Option<SecretString>,

    /// Token from the VAULT_TOKEN environment variable
    #[arg(skip)]
    pub env_token: Option<SecretString>,

    /// Role for Kubernetes service-account login
    #[arg(long)]
    pub k8s_auth_role: Option<String>,

    /// Mount of the Kubernetes auth backend
    #[arg(long, default_value = "kubernetes")]
    pub k8s_login_path: String,

    /// Service-account token file
    #[arg(
        long,
        default_value = "/var/run/secrets/kubernetes.io/serviceaccount/token"
    )]
    pub service_account_token: PathBuf,

    /// Prefix for relative secret paths
    #[arg(long, default_value = "secret")]
    pub secret_prefix: String,

    /// JSON file listing the secrets to fetch
    #[arg(long)]
    pub secrets_config: Option<PathBuf>,

    /// File holding the token and secret leases across restarts
    #[arg(long)]
    pub leases_file: Option<PathBuf>,

    /// File the fetched secrets are written to
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// How long before expiry the token is renewed
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    pub renewal_window: Duration,

    /// TTL extension requested on renewal (default: the TTL the token was issued with)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub renew_increment: Option<Duration>,

    /// Fetch secrets and exit without renewing
    #[arg(long)]
    pub one_shot: bool,

    /// Leave the token valid on exit
    #[arg(long)]
    pub no_revoke_on_exit: bool,

    /// Grace period for background tasks on shutdown
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub shutdown_timeout: Duration,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    pub json_logs: bool,
}

impl Config {
    /// Load `.env`, parse the process arguments and pick up `VAULT_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments; callers print it with
    /// [`clap::Error::exit`].
    pub fn load() -> Result<Self, clap::Error> {
        dotenvy::dotenv().ok();
        let mut config = Self::try_parse()?;
        config.env_token = std::env::var(VAULT_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        Ok(config)
    }

    /// Parse `args` without touching the environment beyond clap's `env`
    /// fallbacks.
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Check settings clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem.
    pub fn validate(&self) -> SidecarResult<()> {
        let addr = url::Url::parse(&self.vault_addr)
            .map_err(|e| SidecarError::config(format!("invalid Vault address {:?}: {e}", self.vault_addr)))?;
        if !matches!(addr.scheme(), "http" | "https") {
            return Err(SidecarError::config(format!(
                "Vault address must use http or https, got {:?}",
                addr.scheme()
            )));
        }
        if self.renewal_window.is_zero() {
            return Err(SidecarError::config("renewal window must be positive"));
        }
        if self.k8s_login_path.trim_matches('/').is_empty() {
            return Err(SidecarError::config("Kubernetes login path must not be empty"));
        }
        if self.renew_increment.is_some_and(|i| i.as_secs() == 0) {
            return Err(SidecarError::config("renew increment must be at least one second"));
        }
        Ok(())
    }

    /// Vault client settings.
    #[must_use]
    pub fn vault_config(&self) -> VaultConfig {
        let mut config = VaultConfig::new(self.vault_addr.clone())
            .with_timeout(self.vault_timeout)
            .with_skip_verify(self.vault_skip_verify);
        if let Some(ca) = &self.vault_ca_cert {
            config = config.with_ca_cert(ca.clone());
        }
        config
    }

    /// Auth chain inputs.
    #[must_use]
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            cli_token: self.vault_token.clone(),
            env_token: self.env_token.clone(),
            k8s_role: self.k8s_auth_role.clone(),
            k8s_login_path: self.k8s_login_path.trim_matches('/').to_string(),
            service_account_token: self.service_account_token.clone(),
            configmap_namespace: DEFAULT_CONFIGMAP_NAMESPACE.to_string(),
            configmap_name: DEFAULT_CONFIGMAP_NAME.to_string(),
        }
    }

    /// Renewal tuning.
    #[must_use]
    pub fn renewal_settings(&self) -> RenewalSettings {
        RenewalSettings {
            window: self.renewal_window,
            increment: self.renew_increment,
            retry: RetryConfig::default(),
        }
    }

    /// Logging setup.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default()
            .with_log_level(self.log_level.clone())
            .with_json_output(self.json_logs)
    }
}
