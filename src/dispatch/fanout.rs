//! Running one request against every account at once

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{AccountError, ApiError, Result, WorkspaceMcpError};
use crate::google::Service;

/// Outcome of a fan-out in which at least one account succeeded
#[derive(Debug, Clone, Serialize)]
pub struct FanOutResult<T> {
    /// Per-account results, keyed by email
    pub results: BTreeMap<String, T>,

    /// Per-account failure messages, keyed by email
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl<T> FanOutResult<T> {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Call `op` for every `(email, client)` concurrently, each call bounded by
/// `timeout`.
///
/// Succeeds when at least one account succeeds. When every account fails,
/// the first failure to arrive is returned. Spawned calls run to completion
/// even if the caller stops waiting.
pub async fn fan_out<C, T, F, Fut>(
    service: Service,
    clients: Vec<(String, Arc<C>)>,
    timeout: Duration,
    op: F,
) -> Result<FanOutResult<T>>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(Arc<C>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    if clients.is_empty() {
        return Err(AccountError::NoAccounts.into());
    }

    let expected = clients.len();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for (email, client) in clients {
        let call = op(client);
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkspaceMcpError::Api(ApiError::Timeout {
                    service: service.name().to_string(),
                    secs: timeout.as_secs(),
                })),
            };
            // The receiver is gone if the caller stopped waiting
            let _ = tx.send((email, outcome));
        });
    }
    drop(tx);

    let mut results = BTreeMap::new();
    let mut errors = BTreeMap::new();
    let mut first_error = None;
    let mut received = 0;

    while let Some((email, outcome)) = rx.recv().await {
        received += 1;
        match outcome {
            Ok(value) => {
                results.insert(email, value);
            }
            Err(e) => {
                tracing::warn!("{} request for {} failed: {}", service, email, e);
                errors.insert(email, e.to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    if received < expected {
        tracing::error!(
            "{} of {} {} fan-out tasks ended without a result",
            expected - received,
            expected,
            service
        );
        first_error.get_or_insert(WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
            service: service.name().to_string(),
            status: 0,
            message: "request task panicked".to_string(),
        }));
    }

    if results.is_empty() {
        return Err(first_error.unwrap_or_else(|| AccountError::NoAccounts.into()));
    }

    Ok(FanOutResult { results, errors })
}
