//! Shared proptest generators.

use proptest::prelude::*;

/// Secret keys as they appear in sidecar configuration.
pub fn secret_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,15}"
}

/// Relative secret paths (no leading slash).
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9-]{1,10}", 1..4).prop_map(|segments| segments.join("/"))
}

/// Absolute secret paths (leading slash).
pub fn absolute_path_strategy() -> impl Strategy<Value = String> {
    relative_path_strategy().prop_map(|path| format!("/{path}"))
}

/// Either kind of secret path.
pub fn secret_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![relative_path_strategy(), absolute_path_strategy()]
}

/// Distinct secret keys.
pub fn unique_keys_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(secret_key_strategy(), 1..=max.max(1))
        .prop_map(|keys| keys.into_iter().collect())
}

/// Vault tokens.
pub fn token_strategy() -> impl Strategy<Value = String> {
    "s\\.[A-Za-z0-9]{24}"
}
