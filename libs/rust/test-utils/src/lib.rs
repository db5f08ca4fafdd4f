//! Shared test utilities for the vault sidecar workspace.
//!
//! This crate provides:
//! - A scriptable mock secret store
//! - Test fixtures with sample Vault responses
//! - Proptest generators for keys, paths and tokens

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{MOCK_ADDRESS, MockSecretStore, Scripted, StoreCall};
