//! Routing tool calls to the right account's client

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::accounts::registry::AccountRegistry;
use crate::auth::token_source::DEFAULT_ACCOUNT_LABEL;
use crate::dispatch::fanout::{fan_out, FanOutResult};
use crate::dispatch::pool::{ClientPool, ServiceClient};
use crate::error::Result;

/// Multi-account entry point for one service
pub struct Dispatcher<C: ServiceClient> {
    registry: Arc<AccountRegistry>,
    pool: Arc<ClientPool<C>>,
    default_client: Option<Arc<C>>,
    timeout: Duration,
}

impl<C: ServiceClient> Dispatcher<C> {
    pub fn new(registry: Arc<AccountRegistry>, pool: Arc<ClientPool<C>>, timeout: Duration) -> Self {
        Self {
            registry,
            pool,
            default_client: None,
            timeout,
        }
    }

    /// Client used when no account can be resolved (legacy single-account mode)
    pub fn with_default_client(mut self, client: Arc<C>) -> Self {
        self.default_client = Some(client);
        self
    }

    pub fn pool(&self) -> &Arc<ClientPool<C>> {
        &self.pool
    }

    /// The account label and client to use for `hint`.
    ///
    /// Falls back to the default client when the account layer cannot
    /// produce one; any other error is returned.
    pub async fn resolve_client(&self, hint: Option<&str>) -> Result<(String, Arc<C>)> {
        let hint = hint.unwrap_or("");

        let resolved = match self.registry.resolve_for_hint(hint).await {
            Ok(account) => self
                .pool
                .get_or_create(&account.email)
                .await
                .map(|client| (account.email, client)),
            Err(e) => Err(e),
        };

        match (resolved, &self.default_client) {
            (Ok(found), _) => Ok(found),
            (Err(e), Some(default)) if e.as_account_error().is_some() => {
                tracing::debug!("Using default {} client: {}", C::SERVICE, e);
                Ok((DEFAULT_ACCOUNT_LABEL.to_string(), default.clone()))
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Run `op` against the client resolved for `hint` and stamp the result
    /// with the account that served it
    pub async fn dispatch<F, Fut>(&self, hint: Option<&str>, op: F) -> Result<Value>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let (account, client) = self.resolve_client(hint).await?;
        let value = op(client).await?;
        Ok(stamp_account(value, &account))
    }

    /// Run `op` against every account concurrently.
    ///
    /// With no registered accounts the default client, if any, is the only
    /// target.
    pub async fn fan_out<T, F, Fut>(&self, op: F) -> Result<FanOutResult<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut clients = self.pool.snapshot().await;
        if clients.is_empty() {
            if let Some(default) = &self.default_client {
                clients.push((DEFAULT_ACCOUNT_LABEL.to_string(), default.clone()));
            }
        }
        fan_out(C::SERVICE, clients, self.timeout, op).await
    }
}

/// Add `"account": <label>` to an object result, or wrap anything else
pub fn stamp_account(value: Value, account: &str) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("account".to_string(), Value::String(account.to_string()));
            Value::Object(map)
        }
        other => json!({ "account": account, "result": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_object() {
        let stamped = stamp_account(json!({"files": []}), "a@x.com");
        assert_eq!(stamped, json!({"files": [], "account": "a@x.com"}));
    }

    #[test]
    fn test_stamp_wraps_non_objects() {
        let stamped = stamp_account(json!([1, 2]), "default");
        assert_eq!(stamped, json!({"account": "default", "result": [1, 2]}));
    }
}
