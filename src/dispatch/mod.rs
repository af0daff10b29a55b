//! Multi-account dispatch
//!
//! Resolves an account for each tool call, hands out the account's cached
//! service client, and fans "all accounts" requests out concurrently.

pub mod dispatcher;
pub mod fanout;
pub mod pool;

pub use dispatcher::Dispatcher;
pub use fanout::FanOutResult;
pub use pool::{AccountEvictor, ClientPool, ServiceClient};
