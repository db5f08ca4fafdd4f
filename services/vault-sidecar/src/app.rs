//! Sidecar lifecycle: authenticate, fetch, keep the token alive, clean up.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vault_client::{SecretStore, VaultClient};

use crate::auth::AuthResolver;
use crate::config::{Config, load_secret_requests};
use crate::error::{SidecarError, SidecarResult};
use crate::fetcher::{SecretFetcher, ensure_unique_keys};
use crate::lease::{FileLeaseStore, LeaseRegistry};
use crate::output::write_secrets;
use crate::platform::{KubeClient, NoPlatform, PlatformClient};
use crate::renewer::LeaseRenewer;
use crate::shutdown::{ShutdownCoordinator, wait_for_signal};

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Auth method that produced the session
    pub method: &'static str,
    /// Keys of the fetched secrets
    pub fetched: Vec<String>,
    /// Keys skipped as missing-ok
    pub skipped: Vec<String>,
    /// Whether the token was revoked on exit
    pub revoked: bool,
}

/// Run the sidecar against the configured Vault until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns the first fatal error.
pub async fn run(config: Config) -> SidecarResult<RunSummary> {
    config.validate()?;

    let store: Arc<dyn SecretStore> = Arc::new(VaultClient::new(config.vault_config())?);
    let platform: Arc<dyn PlatformClient> = match KubeClient::in_cluster() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            debug!(error = %e, "Kubernetes API unavailable");
            Arc::new(NoPlatform::new(e.to_string()))
        }
    };

    run_with(&config, store, platform, wait_for_signal()).await
}

/// Run the sidecar with explicit collaborators, stopping when `shutdown`
/// completes.
///
/// # Errors
///
/// Returns the first fatal error: configuration, authentication, secret
/// fetch, output, or a renewal failure that ended the renewal task.
pub async fn run_with<S>(
    config: &Config,
    store: Arc<dyn SecretStore>,
    platform: Arc<dyn PlatformClient>,
    shutdown: S,
) -> SidecarResult<RunSummary>
where
    S: Future<Output = ()>,
{
    let requests = match &config.secrets_config {
        Some(path) => load_secret_requests(path).await?,
        None => Vec::new(),
    };
    ensure_unique_keys(&requests)?;

    let registry = Arc::new(match &config.leases_file {
        Some(path) => LeaseRegistry::load(Arc::new(FileLeaseStore::new(path))).await?,
        None => LeaseRegistry::in_memory(),
    });

    let resolver = AuthResolver::standard(&config.auth_settings(), Arc::clone(&registry), platform);
    let session = Arc::new(resolver.resolve(store).await?);

    let credential = session.credential().await;
    registry
        .enroll_auth_token(credential.token(), credential.lease())
        .await?;

    let fetched = SecretFetcher::new(config.secret_prefix.clone(), Arc::clone(&registry))
        .fetch(&session, &requests)
        .await?;
    if let Some(path) = &config.output {
        write_secrets(path, &fetched).await?;
    }

    let mut summary = RunSummary {
        method: session.method(),
        fetched: fetched.records.keys().cloned().collect(),
        skipped: fetched.skipped.clone(),
        revoked: false,
    };
    drop(fetched);

    if config.one_shot {
        info!("One-shot mode; leaving the token for the next run");
        registry.flush().await?;
        return Ok(summary);
    }

    let mut coordinator = ShutdownCoordinator::new();
    match LeaseRenewer::new(
        Arc::clone(&session),
        Arc::clone(&registry),
        config.renewal_settings(),
    )
    .await
    {
        Ok(renewer) => {
            let token = coordinator.token();
            coordinator.spawn("token renewer", renewer.run(token));
        }
        Err(SidecarError::NotRenewable(lease)) => {
            info!(lease = %lease, "Vault token is not renewable; skipping renewal");
        }
        Err(e) => return Err(e),
    }

    tokio::pin!(shutdown);
    let exit = tokio::select! {
        () = &mut shutdown => None,
        exit = coordinator.next_exit() => Some(exit),
    };

    let outcome = match exit {
        None => Ok(()),
        Some((task, Ok(()))) => {
            info!(task, "Task finished; waiting for shutdown");
            shutdown.await;
            Ok(())
        }
        Some((task, Err(e))) => {
            error!(task, error = %e, "Task failed; shutting down");
            Err(e)
        }
    };

    coordinator.shutdown(config.shutdown_timeout).await;

    let token_dead = matches!(&outcome, Err(e) if e.is_permission_denied());
    if !config.no_revoke_on_exit && !token_dead {
        summary.revoked = session.revoke_self().await;
        if summary.revoked {
            if let Err(e) = registry.discard_auth_token().await {
                warn!(error = %e, "Failed to drop revoked token from lease file");
            }
        }
    }

    let flushed = registry.flush().await;
    outcome?;
    flushed?;
    Ok(summary)
}
