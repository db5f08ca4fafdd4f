//! Token renewal under a paused clock.

mod common;

use common::{UnwritableStore, renewable_lease, secret, session};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockSecretStore, Scripted, StoreCall, fixtures};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vault_client::Lease;
use vault_sidecar::auth::StaticTokenAuth;
use vault_sidecar::lease::LeaseStoreError;
use vault_sidecar::renewer::next_renewal_delay;
use vault_sidecar::{
    AuthMethod, AuthOutcome, AuthSession, LeaseCategory, LeaseRegistry, LeaseRenewer,
    RenewalSettings, SidecarError,
};

fn settings(window_secs: u64) -> RenewalSettings {
    RenewalSettings {
        window: Duration::from_secs(window_secs),
        ..RenewalSettings::default()
    }
}

async fn registry_holding(token: &str, lease: &Lease) -> Arc<LeaseRegistry> {
    let registry = Arc::new(LeaseRegistry::in_memory());
    registry
        .enroll_auth_token(&secret(token), Some(lease))
        .await
        .unwrap();
    registry
}

#[tokio::test]
async fn non_renewable_lease_is_rejected() {
    let store = MockSecretStore::new();
    let lease = Lease::new("acc", Duration::from_secs(60), false);
    let err = LeaseRenewer::new(
        session(&store, "s.t", Some(lease)),
        Arc::new(LeaseRegistry::in_memory()),
        settings(30),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SidecarError::NotRenewable(ref id) if id == "acc"));

    let err = LeaseRenewer::new(
        session(&store, "s.root", None),
        Arc::new(LeaseRegistry::in_memory()),
        settings(30),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SidecarError::NotRenewable(_)));
}

#[tokio::test(start_paused = true)]
async fn forbidden_renewal_stops_after_one_attempt() {
    let store = MockSecretStore::new();
    store.on_renew(Scripted::Status(403)).await;
    let lease = renewable_lease(600);
    let registry = registry_holding("s.t", &lease).await;

    let mut renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry.clone(), settings(300))
        .await
        .unwrap();
    let err = renewer.renew_once(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SidecarError::PermissionDenied(_)));
    assert!(err.is_permission_denied());
    assert!(!err.is_timeout());
    assert_eq!(store.renew_count().await, 1);
    assert!(registry.auth_token().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let store = MockSecretStore::new();
    store
        .queue_renewals([Scripted::Unavailable, Scripted::Status(502)])
        .await;
    store
        .on_renew(Scripted::Respond(fixtures::renewed_token("s.t", "acc", 7200)))
        .await;
    let lease = renewable_lease(600);
    let registry = registry_holding("s.t", &lease).await;
    let session = session(&store, "s.t", Some(lease));

    let mut renewer = LeaseRenewer::new(session.clone(), registry.clone(), settings(300))
        .await
        .unwrap();
    let renewed = renewer
        .renew_once(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(renewed.ttl, Duration::from_secs(7200));
    assert_eq!(renewer.lease().ttl, Duration::from_secs(7200));
    assert_eq!(store.renew_count().await, 3);
    assert_eq!(session.lease().await, Some(renewed.clone()));
    assert_eq!(registry.lease(&LeaseCategory::AuthToken).await, Some(renewed));
    assert_eq!(registry.auth_token().await.unwrap().expose_secret(), "s.t");
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_times_out_within_window() {
    let store = MockSecretStore::new();
    let lease = renewable_lease(600);
    let registry = registry_holding("s.t", &lease).await;

    let mut renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry.clone(), settings(30))
        .await
        .unwrap();

    let started = Instant::now();
    let err = renewer.renew_once(&CancellationToken::new()).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.is_permission_denied());
    match err {
        SidecarError::RenewalTimedOut { attempts, .. } => assert!(attempts > 1),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() <= Duration::from_secs(30));
    assert!(registry.auth_token().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let store = MockSecretStore::new();
    let lease = renewable_lease(600);
    let registry = registry_holding("s.t", &lease).await;
    let mut renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry, settings(300))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { renewer.renew_once(&cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, SidecarError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn run_renews_ahead_of_expiry_until_cancelled() {
    let store = MockSecretStore::new();
    store
        .on_renew(Scripted::Respond(fixtures::renewed_token("s.t", "acc", 600)))
        .await;
    let lease = renewable_lease(600);
    let registry = registry_holding("s.t", &lease).await;
    let renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry, settings(300))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(renewer.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(store.renew_count().await, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.renew_count().await, 1);

    cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
    assert_eq!(store.renew_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn run_surfaces_permission_denied() {
    let store = MockSecretStore::new();
    store.on_renew(Scripted::Status(403)).await;
    let lease = renewable_lease(60);
    let registry = registry_holding("s.t", &lease).await;
    let renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry, settings(300))
        .await
        .unwrap();

    let err = renewer.run(CancellationToken::new()).await.unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(store.renew_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn run_stops_when_token_loses_renewability() {
    let store = MockSecretStore::new();
    let mut last = fixtures::renewed_token("s.t", "acc", 120);
    if let Some(auth) = last.auth.as_mut() {
        auth.renewable = false;
    }
    store.on_renew(Scripted::Respond(last)).await;
    let lease = renewable_lease(60);
    let registry = registry_holding("s.t", &lease).await;
    let renewer = LeaseRenewer::new(session(&store, "s.t", Some(lease)), registry, settings(300))
        .await
        .unwrap();

    assert!(renewer.run(CancellationToken::new()).await.is_ok());
    assert_eq!(store.renew_count().await, 1);
}

/// Session for `token` validated through `--vault-token`.
async fn validated_session(store: &MockSecretStore, token: &str) -> Arc<AuthSession> {
    let method = StaticTokenAuth::command_line(Some(secret(token)));
    match method.attempt(store).await {
        AuthOutcome::Authenticated(credential) => Arc::new(AuthSession::new(
            Arc::new(store.clone()),
            method.name(),
            credential,
        )),
        other => panic!("token was not accepted: {other:?}"),
    }
}

async fn requested_increments(store: &MockSecretStore) -> Vec<Duration> {
    store
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            StoreCall::RenewSelf { increment, .. } => Some(increment),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn resumed_token_renews_by_its_issued_ttl() {
    let store = MockSecretStore::new();
    store
        .accept_token("s.old", fixtures::aged_token_lookup("s.old", "acc", 2, 3600, true))
        .await;
    store
        .on_renew(Scripted::Respond(fixtures::renewed_token("s.old", "acc", 3600)))
        .await;

    let session = validated_session(&store, "s.old").await;
    let mut renewer = LeaseRenewer::new(
        session,
        Arc::new(LeaseRegistry::in_memory()),
        RenewalSettings::default(),
    )
    .await
    .unwrap();
    assert_eq!(renewer.increment(), Duration::from_secs(3600));

    renewer.renew_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(requested_increments(&store).await, vec![Duration::from_secs(3600)]);
    assert_eq!(
        next_renewal_delay(renewer.lease().ttl, Duration::from_secs(300)),
        Duration::from_secs(3300)
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_issued_ttl_renews_by_at_least_the_window() {
    let store = MockSecretStore::new();
    let lease = renewable_lease(2);
    let renewer = LeaseRenewer::new(
        session(&store, "s.t", Some(lease)),
        Arc::new(LeaseRegistry::in_memory()),
        settings(300),
    )
    .await
    .unwrap();
    assert_eq!(renewer.increment(), Duration::from_secs(300));

    let configured = LeaseRenewer::new(
        session(&store, "s.t", Some(renewable_lease(2))),
        Arc::new(LeaseRegistry::in_memory()),
        RenewalSettings {
            increment: Some(Duration::from_secs(900)),
            ..settings(300)
        },
    )
    .await
    .unwrap();
    assert_eq!(configured.increment(), Duration::from_secs(900));
}

#[tokio::test(start_paused = true)]
async fn renewal_survives_lease_file_write_failure() {
    let store = MockSecretStore::new();
    store
        .on_renew(Scripted::Respond(fixtures::renewed_token("s.t", "acc", 7200)))
        .await;
    let registry = Arc::new(LeaseRegistry::load(Arc::new(UnwritableStore)).await.unwrap());

    let mut renewer = LeaseRenewer::new(
        session(&store, "s.t", Some(renewable_lease(600))),
        registry.clone(),
        settings(300),
    )
    .await
    .unwrap();
    let renewed = renewer
        .renew_once(&CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(registry.lease(&LeaseCategory::AuthToken).await, Some(renewed));
    assert!(matches!(registry.flush().await, Err(LeaseStoreError::Io { .. })));
}
