//! Container-platform client.
//!
//! The sidecar needs one thing from the platform: the ConfigMaps matching a
//! name in a namespace. [`KubeClient`] answers that from inside a pod using
//! the mounted service-account credentials.

use async_trait::async_trait;
use reqwest::Client;
use rust_common::{HttpConfig, build_http_client};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Platform client errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Not running inside a cluster
    #[error("Not running in a Kubernetes cluster: {0}")]
    NotInCluster(String),

    /// Reading in-cluster credentials failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server rejected the request
    #[error("Kubernetes API returned {status} for {url}")]
    Api {
        /// HTTP status
        status: u16,
        /// Request URL
        url: String,
    },
}

/// A ConfigMap's name and string data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigMapRecord {
    /// Object name
    pub name: String,
    /// String data
    pub data: BTreeMap<String, String>,
}

impl ConfigMapRecord {
    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Platform lookups used by the auth chain.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// ConfigMaps called `name` in `namespace`.
    async fn config_maps(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<ConfigMapRecord>, PlatformError>;
}

/// Stand-in used outside a cluster.
#[derive(Debug, Clone)]
pub struct NoPlatform {
    reason: String,
}

impl NoPlatform {
    /// Platform that always reports `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PlatformClient for NoPlatform {
    async fn config_maps(&self, _: &str, _: &str) -> Result<Vec<ConfigMapRecord>, PlatformError> {
        Err(PlatformError::NotInCluster(self.reason.clone()))
    }
}

#[derive(Debug, Clone)]
enum Credentials {
    /// Re-read per request; the kubelet rotates projected tokens.
    File(PathBuf),
    Static(String),
}

/// In-cluster API server client.
#[derive(Debug, Clone)]
pub struct KubeClient {
    base_url: String,
    credentials: Credentials,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ConfigMapList {
    #[serde(default)]
    items: Vec<ConfigMapItem>,
}

#[derive(Debug, Deserialize)]
struct ConfigMapItem {
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

impl KubeClient {
    /// Client configured from the pod environment.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotInCluster`] when the service host
    /// variables are missing, or an I/O error when the CA bundle cannot be
    /// read.
    pub fn in_cluster() -> Result<Self, PlatformError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| PlatformError::NotInCluster("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| PlatformError::NotInCluster("KUBERNETES_SERVICE_PORT is not set".into()))?;

        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|source| PlatformError::Io {
            path: ca_path.display().to_string(),
            source,
        })?;

        let http = build_http_client(&HttpConfig::default().with_root_ca_pem(ca))?;
        Ok(Self {
            base_url: format!("https://{host}:{port}"),
            credentials: Credentials::File(dir.join("token")),
            http,
        })
    }

    /// Client for `base_url` presenting a fixed bearer token.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn with_static_token(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            base_url: base_url.into(),
            credentials: Credentials::Static(token.into()),
            http: build_http_client(&HttpConfig::default())?,
        })
    }

    async fn bearer(&self) -> Result<String, PlatformError> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| t.trim().to_string())
                .map_err(|source| PlatformError::Io {
                    path: path.display().to_string(),
                    source,
                }),
        }
    }
}

#[async_trait]
impl PlatformClient for KubeClient {
    #[instrument(skip(self))]
    async fn config_maps(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<ConfigMapRecord>, PlatformError> {
        let url = format!(
            "{}/api/v1/namespaces/{namespace}/configmaps",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .query(&[("fieldSelector", format!("metadata.name={name}"))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                url,
            });
        }

        let list: ConfigMapList = response.json().await?;
        debug!(count = list.items.len(), "Listed ConfigMaps");

        Ok(list
            .items
            .into_iter()
            .map(|item| ConfigMapRecord {
                name: item.metadata.name,
                data: item.data.unwrap_or_default(),
            })
            .collect())
    }
}
