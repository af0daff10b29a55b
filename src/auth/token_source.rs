//! Bearer token sources for service clients
//!
//! A client never holds a copy of a credential. It asks its token source for
//! an access token on every request, so a refresh made anywhere is picked up
//! by every cached client of that account.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::accounts::registry::AccountRegistry;
use crate::accounts::store::TokenStore;
use crate::accounts::types::Credential;
use crate::auth::oauth::OAuthProvider;
use crate::error::Result;

/// Label used for the legacy single-account client
pub const DEFAULT_ACCOUNT_LABEL: &str = "default";

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Account the tokens belong to
    fn account(&self) -> &str;

    /// A currently usable access token, refreshed first if it is about to expire
    async fn access_token(&self) -> Result<String>;

    /// Scopes recorded for the credential; empty when unknown
    async fn granted_scopes(&self) -> Vec<String>;
}

/// Tokens of a registered account, read from the registry on each call
pub struct AccountTokenSource {
    registry: Arc<AccountRegistry>,
    email: String,
}

impl AccountTokenSource {
    pub fn new(registry: Arc<AccountRegistry>, email: impl Into<String>) -> Self {
        Self {
            registry,
            email: email.into(),
        }
    }
}

#[async_trait]
impl TokenSource for AccountTokenSource {
    fn account(&self) -> &str {
        &self.email
    }

    async fn access_token(&self) -> Result<String> {
        self.registry.access_token(&self.email).await
    }

    async fn granted_scopes(&self) -> Vec<String> {
        self.registry
            .lookup(&self.email)
            .await
            .map(|account| account.token.scopes)
            .unwrap_or_default()
    }
}

/// Tokens of the legacy single-account file.
///
/// Refreshed credentials are kept in memory only; the legacy file is never
/// written.
pub struct LegacyTokenSource {
    provider: Arc<dyn OAuthProvider>,
    credential: Mutex<Credential>,
}

impl LegacyTokenSource {
    pub fn new(provider: Arc<dyn OAuthProvider>, credential: Credential) -> Self {
        Self {
            provider,
            credential: Mutex::new(credential),
        }
    }

    /// Source backed by the legacy token file at `path`, if there is one
    pub fn load(provider: Arc<dyn OAuthProvider>, path: &Path) -> Result<Option<Self>> {
        Ok(TokenStore::read_legacy(path)?.map(|credential| Self::new(provider, credential)))
    }
}

#[async_trait]
impl TokenSource for LegacyTokenSource {
    fn account(&self) -> &str {
        DEFAULT_ACCOUNT_LABEL
    }

    async fn access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;
        if credential.needs_refresh_at(Utc::now()) {
            tracing::debug!("Refreshing legacy default credential");
            *credential = self.provider.refresh(&credential).await?;
        }
        Ok(credential.access_token.clone())
    }

    async fn granted_scopes(&self) -> Vec<String> {
        self.credential.lock().await.scopes.clone()
    }
}
