//! The account registry
//!
//! Single owner of the set of authenticated accounts. The account map sits
//! behind one reader/writer lock: lookups share it, mutations take it
//! exclusively and commit the token file while holding it. Network calls
//! (identity lookup, refresh) are made before the lock is taken.
//!
//! Recording `last_used` on disk is left to a background writer fed through a
//! bounded queue; a touch that does not fit is dropped.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::accounts::resolver;
use crate::accounts::store::TokenStore;
use crate::accounts::types::{Account, Credential};
use crate::auth::oauth::OAuthProvider;
use crate::auth::scopes::merge_scopes;
use crate::error::{AccountError, Result, WorkspaceMcpError};

/// Capacity of the last-used persistence queue
pub const TOUCH_QUEUE_CAPACITY: usize = 64;

struct RegistryState {
    store: TokenStore,
    accounts: RwLock<BTreeMap<String, Account>>,
}

enum TouchRequest {
    Persist(String),
    Flush(oneshot::Sender<()>),
}

/// In-memory map of authenticated accounts, backed by a [`TokenStore`]
pub struct AccountRegistry {
    state: Arc<RegistryState>,
    provider: Arc<dyn OAuthProvider>,
    touch_tx: mpsc::Sender<TouchRequest>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountRegistry {
    /// Create an empty registry and start its touch writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: TokenStore, provider: Arc<dyn OAuthProvider>) -> Self {
        let state = Arc::new(RegistryState {
            store,
            accounts: RwLock::new(BTreeMap::new()),
        });

        let (touch_tx, touch_rx) = mpsc::channel(TOUCH_QUEUE_CAPACITY);
        tokio::spawn(run_touch_writer(state.clone(), touch_rx));

        Self {
            state,
            provider,
            touch_tx,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a registry from disk, importing the legacy token file when no
    /// accounts exist yet. Load and migration failures are logged; the
    /// registry then starts with whatever it has.
    pub async fn open(
        store: TokenStore,
        provider: Arc<dyn OAuthProvider>,
        legacy_token: Option<&Path>,
    ) -> Arc<Self> {
        let registry = Self::new(store, provider);

        match registry.load().await {
            Ok(count) => tracing::info!("Loaded {} account(s)", count),
            Err(e) => tracing::warn!(
                "Failed to read accounts from {}: {}",
                registry.state.store.dir().display(),
                e
            ),
        }

        if let Some(path) = legacy_token {
            match registry.migrate_legacy(path).await {
                Ok(Some(account)) => tracing::info!(
                    "Migrated legacy token {} to account {}",
                    path.display(),
                    account.email
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!("Legacy token migration failed: {}", e),
            }
        }

        Arc::new(registry)
    }

    pub fn store(&self) -> &TokenStore {
        &self.state.store
    }

    pub fn provider(&self) -> Arc<dyn OAuthProvider> {
        self.provider.clone()
    }

    /// Admit every token record on disk. Records without an email get a
    /// one-time identity lookup and are rewritten under their email's key.
    pub async fn load(&self) -> Result<usize> {
        let records = self.state.store.load_all()?;

        let mut admitted = Vec::with_capacity(records.len());
        for account in records {
            if !account.email.is_empty() {
                admitted.push(account);
                continue;
            }
            match self.backfill_identity(account).await {
                Ok(account) => admitted.push(account),
                Err(e) => tracing::warn!("Skipping account without email: {}", e),
            }
        }

        let mut accounts = self.state.accounts.write().await;
        for account in admitted {
            accounts.insert(account.email.clone(), account);
        }
        Ok(accounts.len())
    }

    async fn backfill_identity(&self, mut account: Account) -> Result<Account> {
        if account.token.needs_refresh_at(Utc::now()) {
            account.token = self.provider.refresh(&account.token).await?;
        }

        let info = self.provider.user_info(&account.token).await?;
        if info.email.is_empty() {
            return Err(missing_email());
        }

        let old_file = std::mem::take(&mut account.token_file);
        account.email = info.email;
        if account.name.is_empty() {
            account.name = info.name;
        }
        if account.picture.is_empty() {
            account.picture = info.picture;
        }
        account.token_file = self.state.store.path_for(&account.email);

        self.state.store.save(&account)?;
        if !old_file.as_os_str().is_empty() && old_file != account.token_file {
            if let Err(e) = self.state.store.delete(&old_file) {
                tracing::warn!("Failed to remove old token file {}: {}", old_file.display(), e);
            }
        }

        tracing::info!("Backfilled identity for {}", account.email);
        Ok(account)
    }

    /// Register the identity behind `credential`, overwriting any existing
    /// record for the same email
    pub async fn add(&self, mut credential: Credential) -> Result<Account> {
        let info = self.provider.user_info(&credential).await?;
        if info.email.is_empty() {
            return Err(missing_email());
        }

        if credential.scopes.is_empty() {
            match self.provider.token_scopes(&credential).await {
                Ok(scopes) => credential.scopes = scopes,
                Err(e) => tracing::debug!("Could not look up granted scopes: {}", e),
            }
        }

        let token_file = self.state.store.path_for(&info.email);
        let account = Account::new(info, credential, token_file);

        let mut accounts = self.state.accounts.write().await;
        self.state.store.save(&account)?;
        let previous = accounts.insert(account.email.clone(), account.clone());

        // a record loaded from an older file name would otherwise come back on reload
        if let Some(previous) = previous {
            let old_file = previous.token_file;
            if !old_file.as_os_str().is_empty() && old_file != account.token_file {
                if let Err(e) = self.state.store.delete(&old_file) {
                    tracing::warn!("Failed to remove old token file {}: {}", old_file.display(), e);
                }
            }
        }

        tracing::info!("Added account {}", account.email);
        Ok(account)
    }

    /// Fetch an account and record the access
    pub async fn get(&self, email: &str) -> Result<Account> {
        self.touch(email).await
    }

    /// Fetch an account without recording the access
    pub async fn lookup(&self, email: &str) -> Result<Account> {
        self.state
            .accounts
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| not_found(email))
    }

    /// Snapshot of every account, in email order
    pub async fn list(&self) -> Vec<Account> {
        self.state.accounts.read().await.values().cloned().collect()
    }

    pub async fn emails(&self) -> Vec<String> {
        self.state.accounts.read().await.keys().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.accounts.read().await.is_empty()
    }

    /// Delete an account's token file and forget it.
    ///
    /// Both happen under the exclusive lock. If the file cannot be deleted
    /// the account stays registered.
    pub async fn remove(&self, email: &str) -> Result<Account> {
        let mut accounts = self.state.accounts.write().await;

        let path = match accounts.get(email) {
            Some(account) if !account.token_file.as_os_str().is_empty() => {
                account.token_file.clone()
            }
            Some(_) => self.state.store.path_for(email),
            None => return Err(not_found(email)),
        };

        self.state.store.delete(&path)?;
        let removed = accounts.remove(email).ok_or_else(|| not_found(email))?;
        drop(accounts);
        self.refresh_locks.lock().await.remove(email);

        tracing::info!("Removed account {}", email);
        Ok(removed)
    }

    /// Exchange the account's refresh token for a new credential.
    ///
    /// The new credential is written to disk before it replaces the old one
    /// in memory; on any failure the old credential stays in place. Scopes
    /// the token endpoint leaves out of its response are carried over.
    pub async fn refresh(&self, email: &str) -> Result<Account> {
        let current = self.lookup(email).await?.token;
        let mut refreshed = self.provider.refresh(&current).await?;
        refreshed.scopes = merge_scopes(&current.scopes, &refreshed.scopes);

        let mut accounts = self.state.accounts.write().await;
        let entry = accounts.get_mut(email).ok_or_else(|| not_found(email))?;

        let mut updated = entry.clone();
        updated.token = refreshed;
        self.state.store.save(&updated)?;
        *entry = updated.clone();

        tracing::info!("Refreshed credential for {}", email);
        Ok(updated)
    }

    /// Pick an account for a free-text hint and record the access
    pub async fn resolve_for_hint(&self, hint: &str) -> Result<Account> {
        let email = {
            let accounts = self.state.accounts.read().await;
            resolver::resolve(&accounts, hint)?.email.clone()
        };
        tracing::debug!("Resolved account hint {:?} to {}", hint, email);
        self.touch(&email).await
    }

    /// A usable access token for `email`, refreshing first when the
    /// credential is expired or about to expire.
    ///
    /// Refreshes are serialized per account, so concurrent callers for one
    /// email share a single exchange while other accounts proceed. If the
    /// refresh fails but the current token has not expired yet, the current
    /// token is returned.
    pub async fn access_token(&self, email: &str) -> Result<String> {
        let credential = self.lookup(email).await?.token;
        if !credential.needs_refresh_at(Utc::now()) {
            return Ok(credential.access_token);
        }

        let lock = self.refresh_lock(email).await;
        let _guard = lock.lock().await;

        // another caller may have refreshed while we waited
        let credential = self.lookup(email).await?.token;
        if !credential.needs_refresh_at(Utc::now()) {
            return Ok(credential.access_token);
        }

        match self.refresh(email).await {
            Ok(account) => Ok(account.token.access_token),
            Err(e) if credential.is_valid() => {
                tracing::warn!("Refresh for {} failed, using current token: {}", email, e);
                Ok(credential.access_token)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_lock(&self, email: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .lock()
            .await
            .entry(email.to_string())
            .or_default()
            .clone()
    }

    /// Import the legacy single-account token file when the registry is empty
    pub async fn migrate_legacy(&self, path: &Path) -> Result<Option<Account>> {
        if !self.is_empty().await {
            return Ok(None);
        }

        let Some(mut credential) = TokenStore::read_legacy(path)? else {
            return Ok(None);
        };

        if credential.needs_refresh_at(Utc::now()) {
            credential = self.provider.refresh(&credential).await?;
        }

        self.add(credential).await.map(Some)
    }

    /// Wait until every queued last-used update has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.touch_tx.send(TouchRequest::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    async fn touch(&self, email: &str) -> Result<Account> {
        let account = {
            let mut accounts = self.state.accounts.write().await;
            let account = accounts.get_mut(email).ok_or_else(|| not_found(email))?;
            account.touch(Utc::now());
            account.clone()
        };

        match self.touch_tx.try_send(TouchRequest::Persist(email.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Touch queue full, not persisting last-used for {}", email)
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Touch writer stopped, not persisting last-used for {}", email)
            }
        }

        Ok(account)
    }
}

// Holds the shared lock while writing, so a removal (exclusive) can never
// interleave and a removed account's file is never recreated.
async fn run_touch_writer(state: Arc<RegistryState>, mut rx: mpsc::Receiver<TouchRequest>) {
    while let Some(request) = rx.recv().await {
        match request {
            TouchRequest::Persist(email) => {
                let accounts = state.accounts.read().await;
                match accounts.get(&email) {
                    Some(account) => {
                        if let Err(e) = state.store.save(account) {
                            tracing::warn!("Failed to persist last-used for {}: {}", email, e);
                        }
                    }
                    None => tracing::debug!("Account {} removed before touch was written", email),
                }
            }
            TouchRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn not_found(email: &str) -> WorkspaceMcpError {
    WorkspaceMcpError::Account(AccountError::NotFound {
        email: email.to_string(),
    })
}

fn missing_email() -> WorkspaceMcpError {
    WorkspaceMcpError::Account(AccountError::CredentialExchangeFailed {
        message: "identity lookup returned no email".to_string(),
    })
}
