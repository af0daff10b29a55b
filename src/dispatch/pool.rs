//! Per-service client pools
//!
//! A pool maps account email to one shared client for its service. Clients
//! are built from an [`AccountTokenSource`], never from a copied credential,
//! so a cached client keeps working across refreshes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::accounts::registry::AccountRegistry;
use crate::auth::token_source::{AccountTokenSource, TokenSource};
use crate::error::{AccountError, Result, WorkspaceMcpError};
use crate::google::{ClientSettings, Service};

/// A service client that can be built for one account
pub trait ServiceClient: Send + Sync + Sized + 'static {
    const SERVICE: Service;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self>;
}

/// Something holding per-account state that must go when the account does
#[async_trait]
pub trait AccountEvictor: Send + Sync {
    /// Drop whatever is cached for `email`; returns whether anything was
    async fn evict(&self, email: &str) -> bool;
}

/// Lazily built clients of type `C`, keyed by account email
pub struct ClientPool<C: ServiceClient> {
    registry: Arc<AccountRegistry>,
    settings: ClientSettings,
    clients: RwLock<BTreeMap<String, Arc<C>>>,
}

impl<C: ServiceClient> ClientPool<C> {
    /// Create a pool and build a client for every registered account. An
    /// account whose client cannot be built is logged and left out.
    pub async fn new(registry: Arc<AccountRegistry>, settings: ClientSettings) -> Self {
        let pool = Self {
            registry,
            settings,
            clients: RwLock::new(BTreeMap::new()),
        };

        for email in pool.registry.emails().await {
            if let Err(e) = pool.get_or_create(&email).await {
                tracing::warn!("Skipping {} client for {}: {}", C::SERVICE, email, e);
            }
        }

        pool
    }

    /// The cached client for `email`, building it if needed
    pub async fn get_or_create(&self, email: &str) -> Result<Arc<C>> {
        if let Some(client) = self.clients.read().await.get(email) {
            return Ok(client.clone());
        }

        self.registry.lookup(email).await?;

        let tokens: Arc<dyn TokenSource> =
            Arc::new(AccountTokenSource::new(self.registry.clone(), email));
        let client = C::connect(tokens, &self.settings).map_err(|e| {
            WorkspaceMcpError::Account(AccountError::ClientConstructionFailed {
                service: C::SERVICE.name().to_string(),
                email: email.to_string(),
                message: e.to_string(),
            })
        })?;

        let mut clients = self.clients.write().await;
        let client = clients
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(client))
            .clone();

        tracing::debug!("Created {} client for {}", C::SERVICE, email);
        Ok(client)
    }

    /// Cached client for `email`, without building one
    pub async fn get(&self, email: &str) -> Option<Arc<C>> {
        self.clients.read().await.get(email).cloned()
    }

    /// A client for every registered account, in email order.
    ///
    /// Clients of accounts that are no longer registered are dropped; missing
    /// ones are built, and accounts whose client fails to build are skipped.
    pub async fn snapshot(&self) -> Vec<(String, Arc<C>)> {
        let emails = self.registry.emails().await;
        self.clients
            .write()
            .await
            .retain(|email, _| emails.binary_search(email).is_ok());

        let mut handles = Vec::with_capacity(emails.len());
        for email in emails {
            match self.get_or_create(&email).await {
                Ok(client) => handles.push((email, client)),
                Err(e) => tracing::warn!("Leaving {} out of {} fan-out: {}", email, C::SERVICE, e),
            }
        }
        handles
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

#[async_trait]
impl<C: ServiceClient> AccountEvictor for ClientPool<C> {
    async fn evict(&self, email: &str) -> bool {
        let removed = self.clients.write().await.remove(email).is_some();
        if removed {
            tracing::debug!("Evicted {} client for {}", C::SERVICE, email);
        }
        removed
    }
}
