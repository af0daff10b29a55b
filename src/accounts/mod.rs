//! Multi-account credential management
//!
//! - [`store`]: one token file per account on disk
//! - [`registry`]: the in-memory account set and its mutations
//! - [`resolver`]: picking an account from a free-text hint

pub mod registry;
pub mod resolver;
pub mod store;
pub mod types;

pub use registry::AccountRegistry;
pub use store::TokenStore;
pub use types::{Account, Credential, UserInfo};
