//! Vault response types and the lease they carry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// A time-bounded grant attached to a token or secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease identifier (token accessor for auth tokens)
    pub id: String,
    /// Remaining time to live
    pub ttl: Duration,
    /// Whether the lease can be extended
    pub renewable: bool,
}

impl Lease {
    /// Create a lease.
    #[must_use]
    pub fn new(id: impl Into<String>, ttl: Duration, renewable: bool) -> Self {
        Self {
            id: id.into(),
            ttl,
            renewable,
        }
    }
}

/// Generic Vault response envelope.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    /// Request identifier
    #[serde(default)]
    pub request_id: String,
    /// Lease identifier, empty for static values
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease is renewable
    #[serde(default)]
    pub renewable: bool,
    /// Payload
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Warnings attached by the server
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    /// Auth block, present on login and renewal responses
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Auth block of a Vault response.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretAuth {
    /// Issued token
    pub client_token: String,
    /// Token accessor
    #[serde(default)]
    pub accessor: String,
    /// Attached policies
    #[serde(default)]
    pub policies: Vec<String>,
    /// Token TTL in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token is renewable
    #[serde(default)]
    pub renewable: bool,
}

impl fmt::Debug for SecretAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretAuth")
            .field("client_token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Option<Vec<&String>> = self.data.as_ref().map(|d| d.keys().collect());
        f.debug_struct("Secret")
            .field("request_id", &self.request_id)
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("data_fields", &fields)
            .field("warnings", &self.warnings)
            .field("auth", &self.auth)
            .finish()
    }
}

impl Secret {
    /// Lease attached to a secret value; `None` for static values.
    #[must_use]
    pub fn lease(&self) -> Option<Lease> {
        if self.lease_id.is_empty() && self.lease_duration == 0 {
            return None;
        }
        Some(Lease::new(
            self.lease_id.clone(),
            Duration::from_secs(self.lease_duration),
            self.renewable,
        ))
    }

    /// Token carried by the response, from the auth block or from
    /// `lookup-self` data.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        if let Some(auth) = self.auth.as_ref().filter(|a| !a.client_token.is_empty()) {
            return Some(&auth.client_token);
        }
        self.data_str("id").filter(|id| !id.is_empty())
    }

    /// Token accessor.
    #[must_use]
    pub fn token_accessor(&self) -> Option<&str> {
        match &self.auth {
            Some(auth) if !auth.accessor.is_empty() => Some(&auth.accessor),
            _ => self.data_str("accessor").filter(|a| !a.is_empty()),
        }
    }

    /// Token TTL.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        match &self.auth {
            Some(auth) => Duration::from_secs(auth.lease_duration),
            None => Duration::from_secs(self.data_u64("ttl").unwrap_or(0)),
        }
    }

    /// TTL the token was issued with.
    ///
    /// `lookup-self` reports the remaining TTL in `ttl` and the original one
    /// in `creation_ttl`; a login or renewal reports the granted duration.
    #[must_use]
    pub fn token_creation_ttl(&self) -> Option<Duration> {
        let secs = match &self.auth {
            Some(auth) => auth.lease_duration,
            None => self.data_u64("creation_ttl")?,
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Whether the token is renewable.
    #[must_use]
    pub fn token_renewable(&self) -> bool {
        match &self.auth {
            Some(auth) => auth.renewable,
            None => self
                .data
                .as_ref()
                .and_then(|d| d.get("renewable"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Lease of the token carried by the response; `None` for tokens that
    /// never expire.
    #[must_use]
    pub fn token_lease(&self) -> Option<Lease> {
        let ttl = self.token_ttl();
        if ttl.is_zero() {
            return None;
        }
        Some(Lease::new(
            self.token_accessor().unwrap_or_default(),
            ttl,
            self.token_renewable(),
        ))
    }

    fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }

    fn data_u64(&self, field: &str) -> Option<u64> {
        self.data.as_ref()?.get(field)?.as_u64()
    }
}
