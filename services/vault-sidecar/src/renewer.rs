//! Auth token renewal.
//!
//! A 403 from `renew-self` means the token was revoked or lost its
//! policies; it is surfaced at once as [`SidecarError::PermissionDenied`].
//! Every other failure is retried with backoff until the renewal window
//! closes, then surfaced as [`SidecarError::RenewalTimedOut`].
//!
//! A renewed lease that cannot be written to the lease file is logged and
//! renewal carries on: the registry keeps the update in memory and the
//! shutdown flush reports the write failure.

use rust_common::{Backoff, RetryConfig, RetryError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vault_client::Lease;

use crate::error::{SidecarError, SidecarResult};
use crate::lease::LeaseRegistry;
use crate::session::AuthSession;

const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

/// Renewal tuning.
#[derive(Debug, Clone)]
pub struct RenewalSettings {
    /// How long before expiry to renew; also the retry budget
    pub window: Duration,
    /// Requested TTL extension; defaults to the TTL the token was issued
    /// with, or the window when Vault did not report it
    pub increment: Option<Duration>,
    /// Backoff shape; its elapsed-time budget is replaced by `window`
    pub retry: RetryConfig,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5 * 60),
            increment: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Time to wait before renewing a lease with `ttl` remaining.
///
/// Renews `window` before expiry, or halfway through when the TTL is no
/// longer than the window.
#[must_use]
pub fn next_renewal_delay(ttl: Duration, window: Duration) -> Duration {
    let delay = if ttl > window { ttl - window } else { ttl / 2 };
    delay.max(MIN_RENEWAL_DELAY)
}

/// Keeps the session token alive.
#[derive(Debug)]
pub struct LeaseRenewer {
    session: Arc<AuthSession>,
    registry: Arc<LeaseRegistry>,
    policy: RetryPolicy,
    window: Duration,
    increment: Duration,
    lease: Lease,
}

impl LeaseRenewer {
    /// Renewer for the session's current lease.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::NotRenewable`] when the session token has no
    /// lease or its lease is not renewable.
    pub async fn new(
        session: Arc<AuthSession>,
        registry: Arc<LeaseRegistry>,
        settings: RenewalSettings,
    ) -> SidecarResult<Self> {
        let credential = session.credential().await;
        let lease = match credential.lease() {
            Some(lease) if lease.renewable => lease.clone(),
            Some(lease) => return Err(SidecarError::NotRenewable(lease.id.clone())),
            None => return Err(SidecarError::NotRenewable(String::new())),
        };

        // A looked-up lease only carries the remaining TTL.
        let increment = settings
            .increment
            .or(credential.issued_ttl())
            .unwrap_or_else(|| lease.ttl.max(settings.window));
        let policy = RetryPolicy::new(settings.retry.with_max_elapsed_time(settings.window));

        Ok(Self {
            session,
            registry,
            policy,
            window: settings.window,
            increment,
            lease,
        })
    }

    /// TTL extension requested on each renewal.
    #[must_use]
    pub const fn increment(&self) -> Duration {
        self.increment
    }

    /// Lease as of the last successful renewal.
    #[must_use]
    pub const fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Renew once, retrying transient failures within the window.
    ///
    /// Returns the refreshed lease, or `None` when Vault stopped attaching
    /// a lease to the token.
    ///
    /// # Errors
    ///
    /// [`SidecarError::PermissionDenied`] on a 403 (the persisted token is
    /// discarded), [`SidecarError::RenewalTimedOut`] when the window closes,
    /// [`SidecarError::Cancelled`] when `cancel` fires.
    pub async fn renew_once(&mut self, cancel: &CancellationToken) -> SidecarResult<Option<Lease>> {
        info!("Renewing Vault authentication token");
        let session = &self.session;
        let increment = self.increment;

        let result = self
            .policy
            .execute_cancellable(cancel, move || async move {
                session.renew(increment).await.map_err(|e| {
                    error!(error = %e, "Error renewing authentication token");
                    if e.is_permission_denied() {
                        Backoff::permanent(e)
                    } else {
                        Backoff::transient(e)
                    }
                })
            })
            .await;

        let credential = match result {
            Ok(credential) => credential,
            Err(RetryError::Permanent(e)) => {
                if let Err(persist) = self.registry.discard_auth_token().await {
                    warn!(error = %persist, "Failed to discard revoked token from lease file");
                }
                return Err(SidecarError::PermissionDenied(e));
            }
            Err(RetryError::Exhausted { last, attempts, .. }) => {
                return Err(SidecarError::RenewalTimedOut {
                    attempts,
                    source: last,
                });
            }
            Err(RetryError::Cancelled { .. }) => return Err(SidecarError::Cancelled),
        };

        info!(
            ttl = ?credential.lease().map(|l| l.ttl),
            "Vault authentication token renewed"
        );
        if let Err(e) = self
            .registry
            .enroll_auth_token(credential.token(), credential.lease())
            .await
        {
            warn!(error = %e, "Failed to persist renewed token lease");
        }

        if let Some(lease) = credential.lease() {
            self.lease = lease.clone();
        }
        Ok(credential.lease().cloned())
    }

    /// Renew ahead of expiry until `cancel` fires or renewal fails.
    ///
    /// # Errors
    ///
    /// Returns the permission or timeout failure that ended renewal.
    pub async fn run(mut self, cancel: CancellationToken) -> SidecarResult<()> {
        loop {
            let delay = next_renewal_delay(self.lease.ttl, self.window);
            info!(delay = ?delay, "Next token renewal scheduled");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }

            match self.renew_once(&cancel).await {
                Ok(Some(lease)) if lease.renewable => {}
                Ok(_) => {
                    warn!("Vault token is no longer renewable; stopping renewal");
                    return Ok(());
                }
                Err(SidecarError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
