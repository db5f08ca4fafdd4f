//! Vault sidecar - credential bootstrap for workloads.
//!
//! The sidecar authenticates to Vault with the first configured method,
//! fetches the configured secrets, keeps its token renewed for the life of
//! the process, and revokes the token on orderly shutdown.
//!
//! Authentication methods, in priority order:
//! 1. token persisted in the lease file by a previous run
//! 2. `--vault-token`
//! 3. `VAULT_TOKEN`
//! 4. the `vault-token` ConfigMap in the `default` namespace
//! 5. Kubernetes service-account login with `--k8s-auth-role`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lease;
pub mod output;
pub mod platform;
pub mod renewer;
pub mod session;
pub mod shutdown;

pub use app::{RunSummary, run, run_with};
pub use auth::{AuthMethod, AuthOutcome, AuthResolver, AuthSettings};
pub use config::{Config, SecretRequest};
pub use error::{SidecarError, SidecarResult};
pub use fetcher::{FetchedSecrets, SecretFetcher, SecretRecord};
pub use lease::{FileLeaseStore, LeaseCategory, LeaseRegistry, LeaseStore};
pub use platform::{ConfigMapRecord, KubeClient, NoPlatform, PlatformClient, PlatformError};
pub use renewer::{LeaseRenewer, RenewalSettings};
pub use session::{AuthSession, Credential};
