//! Shared helpers for the sidecar integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use test_utils::MockSecretStore;
use vault_client::Lease;
use vault_sidecar::lease::{LeaseSnapshot, LeaseStoreError};
use vault_sidecar::{
    AuthSession, ConfigMapRecord, Credential, LeaseStore, PlatformClient, PlatformError,
};

/// What the mock platform answers.
#[derive(Debug, Clone)]
pub enum PlatformScript {
    Records(Vec<ConfigMapRecord>),
    NotInCluster,
    ApiError(u16),
}

/// Scripted platform client counting its calls.
#[derive(Debug)]
pub struct MockPlatformClient {
    script: PlatformScript,
    calls: AtomicUsize,
}

impl MockPlatformClient {
    pub fn new(script: PlatformScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn not_in_cluster() -> Arc<Self> {
        Self::new(PlatformScript::NotInCluster)
    }

    pub fn with_records(records: Vec<ConfigMapRecord>) -> Arc<Self> {
        Self::new(PlatformScript::Records(records))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn config_maps(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Vec<ConfigMapRecord>, PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            PlatformScript::Records(records) => Ok(records.clone()),
            PlatformScript::NotInCluster => {
                Err(PlatformError::NotInCluster("KUBERNETES_SERVICE_HOST is not set".into()))
            }
            PlatformScript::ApiError(status) => Err(PlatformError::Api {
                status: *status,
                url: "https://kubernetes.mock/api/v1/namespaces/default/configmaps".into(),
            }),
        }
    }
}

pub fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMapRecord {
    ConfigMapRecord {
        name: name.to_string(),
        data: data
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub fn renewable_lease(ttl_secs: u64) -> Lease {
    Lease::new("accessor", Duration::from_secs(ttl_secs), true)
}

/// Session over `store` holding `token` with `lease`.
pub fn session(store: &MockSecretStore, token: &str, lease: Option<Lease>) -> Arc<AuthSession> {
    Arc::new(AuthSession::new(
        Arc::new(store.clone()),
        "test",
        Credential::new(secret(token), lease),
    ))
}

/// Write a service-account token file under `dir`.
pub fn write_jwt(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("token");
    std::fs::write(&path, "sa.jwt.value\n").unwrap();
    path
}

/// Lease store whose writes always fail.
pub struct UnwritableStore;

#[async_trait]
impl LeaseStore for UnwritableStore {
    async fn load(&self) -> Result<Option<LeaseSnapshot>, LeaseStoreError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: &LeaseSnapshot) -> Result<(), LeaseStoreError> {
        Err(LeaseStoreError::Io {
            path: "leases.json".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }
}
