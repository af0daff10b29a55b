//! Tool handlers, one per service

pub mod accounts;
pub mod calendar;
pub mod docs;
pub mod drive;
pub mod gmail;
pub mod sheets;

use serde::Serialize;
use serde_json::{json, Value};

use crate::dispatch::FanOutResult;
use crate::error::Result;

pub use accounts::AccountsHandler;
pub use calendar::CalendarHandler;
pub use docs::DocsHandler;
pub use drive::DriveHandler;
pub use gmail::GmailHandler;
pub use sheets::SheetsHandler;

/// Render a fan-out as `{results, errors, partial, total_count,
/// account_count}`, where `count` gives the number of items one account
/// returned
pub fn fan_out_json<T, F>(outcome: FanOutResult<T>, count: F) -> Result<Value>
where
    T: Serialize,
    F: Fn(&T) -> usize,
{
    let total: usize = outcome.results.values().map(&count).sum();
    let account_count = outcome.results.len();
    let partial = outcome.is_partial();
    if partial {
        tracing::warn!(
            "Fan-out answered by {} account(s), {} failed",
            account_count,
            outcome.errors.len()
        );
    }

    let mut value = serde_json::to_value(&outcome)?;
    value["partial"] = json!(partial);
    value["total_count"] = json!(total);
    value["account_count"] = json!(account_count);
    Ok(value)
}
