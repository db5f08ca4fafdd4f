//! Secret fetch batches against the mock store.

mod common;

use common::{UnwritableStore, renewable_lease, session};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockSecretStore, Scripted, fixtures};
use tokio_test::assert_ok;
use vault_sidecar::{LeaseCategory, LeaseRegistry, SecretFetcher, SecretRequest, SidecarError};

fn request(key: &str, path: &str, missing_ok: bool) -> SecretRequest {
    SecretRequest {
        key: key.to_string(),
        path: path.to_string(),
        missing_ok,
    }
}

fn fetcher(registry: &Arc<LeaseRegistry>) -> SecretFetcher {
    SecretFetcher::new("secret", Arc::clone(registry))
}

#[tokio::test]
async fn duplicate_keys_fail_before_any_read() {
    let store = MockSecretStore::new();
    let registry = Arc::new(LeaseRegistry::in_memory());
    let requests = [
        request("db", "app/db", false),
        request("api", "app/api", false),
        request("db", "app/other", false),
    ];

    let err = fetcher(&registry)
        .fetch(&session(&store, "s.t", None), &requests)
        .await
        .unwrap_err();

    assert!(matches!(err, SidecarError::DuplicateSecretKey(ref key) if key == "db"));
    assert_eq!(store.call_count().await, 0);
}

#[tokio::test]
async fn relative_and_absolute_paths() {
    let store = MockSecretStore::new();
    store
        .on_read("secret/app/db", Scripted::Respond(fixtures::kv_secret(json!({"password": "p"}))))
        .await;
    store
        .on_read(
            "database/creds/ro",
            Scripted::Respond(fixtures::leased_secret(
                "database/creds/ro/abc",
                3600,
                json!({"username": "v-ro", "password": "x"}),
            )),
        )
        .await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let fetched = assert_ok!(
        fetcher(&registry)
            .fetch(
                &session(&store, "s.t", None),
                &[
                    request("db", "app/db", false),
                    request("dyn", "/database/creds/ro", false),
                ],
            )
            .await
    );

    assert_eq!(
        store.read_paths().await,
        vec!["secret/app/db".to_string(), "/database/creds/ro".to_string()]
    );
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched.get("db").unwrap().data["password"], "p");
    assert!(fetched.get("db").unwrap().lease.is_none());

    let lease = fetched.get("dyn").unwrap().lease.clone().unwrap();
    assert_eq!(lease.id, "database/creds/ro/abc");
    assert_eq!(lease.ttl, Duration::from_secs(3600));
    assert_eq!(
        registry.lease(&LeaseCategory::Secret("dyn".into())).await,
        Some(lease)
    );
    assert!(registry.lease(&LeaseCategory::Secret("db".into())).await.is_none());
}

#[tokio::test]
async fn missing_ok_secret_is_omitted() {
    let store = MockSecretStore::new();
    store
        .on_read("secret/app/a", Scripted::Respond(fixtures::kv_secret(json!({"v": 1}))))
        .await;
    store.on_read("secret/app/optional", Scripted::Empty).await;
    store
        .on_read("secret/app/c", Scripted::Respond(fixtures::kv_secret(json!({"v": 3}))))
        .await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let fetched = fetcher(&registry)
        .fetch(
            &session(&store, "s.t", None),
            &[
                request("a", "app/a", false),
                request("optional", "app/optional", true),
                request("c", "app/c", false),
            ],
        )
        .await
        .unwrap();

    assert_eq!(fetched.records.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(fetched.skipped, vec!["optional".to_string()]);
}

#[tokio::test]
async fn missing_required_secret_aborts_the_batch() {
    let store = MockSecretStore::new();
    store
        .on_read("secret/app/a", Scripted::Respond(fixtures::kv_secret(json!({"v": 1}))))
        .await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let err = fetcher(&registry)
        .fetch(
            &session(&store, "s.t", None),
            &[
                request("a", "app/a", false),
                request("gone", "app/gone", false),
                request("never", "app/never", false),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SidecarError::MissingSecret { ref key, .. } if key == "gone"));
    assert_eq!(
        store.read_paths().await,
        vec!["secret/app/a".to_string(), "secret/app/gone".to_string()]
    );
}

#[tokio::test]
async fn empty_payload_counts_as_missing() {
    let store = MockSecretStore::new();
    store
        .on_read("secret/app/empty", Scripted::Respond(fixtures::kv_secret(json!({}))))
        .await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let err = fetcher(&registry)
        .fetch(&session(&store, "s.t", None), &[request("e", "app/empty", false)])
        .await
        .unwrap_err();
    assert!(matches!(err, SidecarError::MissingSecret { .. }));

    let fetched = assert_ok!(
        fetcher(&registry)
            .fetch(&session(&store, "s.t", None), &[request("e", "app/empty", true)])
            .await
    );
    assert!(fetched.is_empty());
    assert_eq!(fetched.skipped, vec!["e".to_string()]);
}

#[tokio::test]
async fn unpersisted_secret_lease_fails_the_fetch() {
    let store = MockSecretStore::new();
    store
        .on_read(
            "database/creds/ro",
            Scripted::Respond(fixtures::leased_secret("database/creds/ro/1", 600, json!({"u": "x"}))),
        )
        .await;
    let registry = Arc::new(LeaseRegistry::load(Arc::new(UnwritableStore)).await.unwrap());

    let err = fetcher(&registry)
        .fetch(&session(&store, "s.t", None), &[request("dyn", "/database/creds/ro", false)])
        .await
        .unwrap_err();
    assert!(matches!(err, SidecarError::LeaseFile(_)));
}

#[tokio::test]
async fn store_error_is_fatal_even_when_missing_ok() {
    let store = MockSecretStore::new();
    store.on_read("secret/app/a", Scripted::Status(500)).await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let err = fetcher(&registry)
        .fetch(&session(&store, "s.t", None), &[request("a", "app/a", true)])
        .await
        .unwrap_err();

    match err {
        SidecarError::SecretFetch { path, source, .. } => {
            assert_eq!(path, "secret/app/a");
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_read_is_permission_denied() {
    let store = MockSecretStore::new();
    store.on_read("secret/app/a", Scripted::Status(403)).await;
    let registry = Arc::new(LeaseRegistry::in_memory());

    let err = fetcher(&registry)
        .fetch(
            &session(&store, "s.t", Some(renewable_lease(60))),
            &[request("a", "app/a", false)],
        )
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
}
