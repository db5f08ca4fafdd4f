//! HashiCorp Vault client for the vault sidecar.
//!
//! Provides the [`SecretStore`] abstraction, a reqwest-backed
//! [`VaultClient`] implementing it, and the response and lease types.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod secrets;

pub use client::VaultClient;
pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use provider::SecretStore;
pub use secrets::{Lease, Secret, SecretAuth};
