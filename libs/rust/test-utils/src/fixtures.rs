//! Test fixtures with sample Vault responses.

use serde_json::{Map, Value, json};
use vault_client::{Secret, SecretAuth};

/// `lookup-self` response for a token.
#[must_use]
pub fn token_lookup(token: &str, accessor: &str, ttl_secs: u64, renewable: bool) -> Secret {
    aged_token_lookup(token, accessor, ttl_secs, ttl_secs, renewable)
}

/// `lookup-self` response for a token issued with `creation_ttl_secs` that
/// has `ttl_secs` left.
#[must_use]
pub fn aged_token_lookup(
    token: &str,
    accessor: &str,
    ttl_secs: u64,
    creation_ttl_secs: u64,
    renewable: bool,
) -> Secret {
    Secret {
        data: Some(object(json!({
            "id": token,
            "accessor": accessor,
            "ttl": ttl_secs,
            "creation_ttl": creation_ttl_secs,
            "renewable": renewable,
            "policies": ["default"],
        }))),
        ..Secret::default()
    }
}

/// Login response issuing `token`.
#[must_use]
pub fn login_response(token: &str, accessor: &str, ttl_secs: u64) -> Secret {
    Secret {
        auth: Some(SecretAuth {
            client_token: token.to_string(),
            accessor: accessor.to_string(),
            policies: vec!["default".to_string()],
            lease_duration: ttl_secs,
            renewable: true,
        }),
        ..Secret::default()
    }
}

/// `renew-self` response; Vault echoes the token with a refreshed TTL.
#[must_use]
pub fn renewed_token(token: &str, accessor: &str, ttl_secs: u64) -> Secret {
    login_response(token, accessor, ttl_secs)
}

/// Static key/value secret without a lease.
#[must_use]
pub fn kv_secret(fields: Value) -> Secret {
    Secret {
        data: Some(object(fields)),
        ..Secret::default()
    }
}

/// Leased dynamic secret.
#[must_use]
pub fn leased_secret(lease_id: &str, ttl_secs: u64, fields: Value) -> Secret {
    Secret {
        lease_id: lease_id.to_string(),
        lease_duration: ttl_secs,
        renewable: true,
        data: Some(object(fields)),
        ..Secret::default()
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
