//! Vault HTTP client.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    provider::SecretStore,
    secrets::Secret,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rust_common::{HttpConfig, build_http_client};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Stateless Vault client; callers supply the token per request.
#[derive(Debug, Clone)]
pub struct VaultClient {
    config: VaultConfig,
    http: Client,
}

impl VaultClient {
    /// Create a new Vault client.
    ///
    /// # Errors
    ///
    /// Fails when the CA bundle cannot be read or the HTTP client cannot be
    /// built.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        let mut http_config = HttpConfig::default()
            .with_timeout(config.timeout)
            .with_insecure_tls(config.skip_verify);

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                VaultError::InvalidConfig(format!("reading CA bundle {}: {e}", path.display()))
            })?;
            http_config = http_config.with_root_ca_pem(pem);
        }

        let http = build_http_client(&http_config)?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.addr.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> VaultResult<Option<Secret>> {
        let url = self.url(path);
        let mut request = self.http.request(method, &url);

        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            return Err(VaultError::api(status.as_u16(), url, body.errors));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn expect_secret(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> VaultResult<Secret> {
        self.request(method, path, token, body)
            .await?
            .ok_or_else(|| VaultError::unavailable(format!("empty response from {path}")))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    fn address(&self) -> &str {
        &self.config.addr
    }

    #[instrument(skip(self, payload), fields(addr = %self.config.addr))]
    async fn login(&self, mount: &str, payload: Value) -> VaultResult<Secret> {
        let path = format!("auth/{}/login", mount.trim_matches('/'));
        let secret = self
            .request(Method::POST, &path, None, Some(&payload))
            .await?
            .ok_or_else(|| VaultError::auth_failed(format!("empty response from {path}")))?;

        if secret.auth.is_none() {
            return Err(VaultError::auth_failed(format!("{path} returned no auth block")));
        }
        debug!("Login succeeded");
        Ok(secret)
    }

    #[instrument(skip_all, fields(addr = %self.config.addr))]
    async fn lookup_self(&self, token: &str) -> VaultResult<Secret> {
        self.expect_secret(Method::GET, "auth/token/lookup-self", Some(token), None)
            .await
    }

    #[instrument(skip(self, token), fields(addr = %self.config.addr))]
    async fn renew_self(&self, token: &str, increment: Duration) -> VaultResult<Secret> {
        let body = serde_json::json!({ "increment": increment.as_secs() });
        self.expect_secret(Method::POST, "auth/token/renew-self", Some(token), Some(&body))
            .await
    }

    #[instrument(skip_all, fields(addr = %self.config.addr))]
    async fn revoke_self(&self, token: &str) -> VaultResult<()> {
        self.request(Method::POST, "auth/token/revoke-self", Some(token), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(addr = %self.config.addr))]
    async fn read(&self, token: &str, path: &str) -> VaultResult<Option<Secret>> {
        match self.request(Method::GET, path, Some(token), None).await {
            Err(VaultError::Api { status: 404, .. }) => {
                debug!(path, "Nothing stored at path");
                Ok(None)
            }
            other => other,
        }
    }
}
