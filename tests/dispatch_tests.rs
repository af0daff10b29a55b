//! Client pool, dispatcher and fan-out over registered accounts

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{add_account, registry, settings, FakeClient, MockOAuth};
use google_workspace_mcp::auth::{LegacyTokenSource, TokenSource};
use google_workspace_mcp::dispatch::{AccountEvictor, ClientPool, Dispatcher, ServiceClient};
use google_workspace_mcp::error::{AccountError, WorkspaceMcpError};

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_pool_builds_eagerly_and_skips_failures() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "a@x.com", "A").await;
    add_account(&registry, &provider, "broken@x.com", "B").await;

    let pool = ClientPool::<FakeClient>::new(registry.clone(), settings()).await;
    assert_eq!(pool.len().await, 1);
    assert!(pool.get("a@x.com").await.is_some());
    assert!(pool.get("broken@x.com").await.is_none());

    let err = pool.get_or_create("broken@x.com").await.err().unwrap();
    assert!(matches!(
        err,
        WorkspaceMcpError::Account(AccountError::ClientConstructionFailed { .. })
    ));

    let err = pool.get_or_create("ghost@x.com").await.err().unwrap();
    assert!(matches!(err, WorkspaceMcpError::Account(AccountError::NotFound { .. })));
}

#[tokio::test]
async fn test_pool_returns_the_same_client() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "a@x.com", "A").await;

    let pool = ClientPool::<FakeClient>::new(registry, settings()).await;
    let first = pool.get_or_create("a@x.com").await.unwrap();
    let second = pool.get_or_create("a@x.com").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_cached_client_sees_refreshed_credential() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    let account = add_account(&registry, &provider, "a@x.com", "A").await;

    let pool = ClientPool::<FakeClient>::new(registry.clone(), settings()).await;
    let client = pool.get_or_create("a@x.com").await.unwrap();
    assert_eq!(client.token().await.unwrap(), account.token.access_token);

    let refreshed = registry.refresh("a@x.com").await.unwrap();
    assert_eq!(client.token().await.unwrap(), refreshed.token.access_token);
}

#[tokio::test]
async fn test_removed_account_leaves_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "a@x.com", "A").await;
    add_account(&registry, &provider, "b@x.com", "B").await;

    let pool = ClientPool::<FakeClient>::new(registry.clone(), settings()).await;
    registry.remove("a@x.com").await.unwrap();

    let snapshot: Vec<String> = pool.snapshot().await.into_iter().map(|(e, _)| e).collect();
    assert_eq!(snapshot, vec!["b@x.com"]);

    assert!(pool.evict("b@x.com").await);
    assert!(!pool.evict("b@x.com").await);
}

#[tokio::test]
async fn test_dispatch_stamps_resolved_account() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "a@x.com", "A").await;
    add_account(&registry, &provider, "b@y.com", "B").await;

    let pool = Arc::new(ClientPool::<FakeClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry.clone(), pool, TIMEOUT);

    let value = dispatcher
        .dispatch(Some("files for b@y.com"), |client| async move {
            Ok(json!({ "served_by": client.account() }))
        })
        .await
        .unwrap();
    assert_eq!(value, json!({ "served_by": "b@y.com", "account": "b@y.com" }));

    let err = dispatcher
        .dispatch(None, |_client| async move { Ok(json!({})) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkspaceMcpError::Account(AccountError::AmbiguousAccount { .. })
    ));
}

#[tokio::test]
async fn test_dispatch_falls_back_to_default_client() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());

    let legacy: Arc<dyn TokenSource> = Arc::new(LegacyTokenSource::new(
        provider.clone(),
        common::credential("legacy", 3600),
    ));
    let default = Arc::new(FakeClient::connect(legacy, &settings()).unwrap());

    let pool = Arc::new(ClientPool::<FakeClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry.clone(), pool, TIMEOUT).with_default_client(default);

    let value = dispatcher
        .dispatch(None, |client| async move {
            Ok(json!({ "token": client.token().await? }))
        })
        .await
        .unwrap();
    assert_eq!(value["account"], "default");
    assert_eq!(value["token"], "legacy");

    let outcome = dispatcher
        .fan_out(|client| async move { client.item_count().await })
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results.contains_key("default"));
}

#[tokio::test]
async fn test_fan_out_collects_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "ab@x.com", "A").await;
    add_account(&registry, &provider, "fail@x.com", "F").await;
    add_account(&registry, &provider, "cde@y.com", "C").await;

    let pool = Arc::new(ClientPool::<FakeClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry, pool, TIMEOUT);

    let outcome = dispatcher
        .fan_out(|client| async move { client.item_count().await })
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results.values().sum::<usize>(), 5);
    assert!(outcome.errors["fail@x.com"].contains("is down"));
}

#[tokio::test]
async fn test_fan_out_all_failing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    add_account(&registry, &provider, "fail1@x.com", "F").await;
    add_account(&registry, &provider, "fail2@x.com", "G").await;

    let pool = Arc::new(ClientPool::<FakeClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry, pool, TIMEOUT);

    let err = dispatcher
        .fan_out(|client| async move { client.item_count().await })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is down"));
}

#[tokio::test]
async fn test_fan_out_without_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider);

    let pool = Arc::new(ClientPool::<FakeClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry, pool, TIMEOUT);

    let err = dispatcher
        .fan_out(|client| async move { client.item_count().await })
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceMcpError::Account(AccountError::NoAccounts)));
}
