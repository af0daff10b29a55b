//! OAuth flow, token sources and error remediation

pub mod callback;
pub mod oauth;
pub mod remediation;
pub mod scopes;
pub mod token_source;

pub use oauth::{GoogleOAuth, OAuthKeys, OAuthProvider};
pub use token_source::{AccountTokenSource, LegacyTokenSource, TokenSource};
