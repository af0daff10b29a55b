//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use google_workspace_mcp::accounts::{AccountRegistry, Credential, TokenStore, UserInfo};
use google_workspace_mcp::auth::{OAuthProvider, TokenSource};
use google_workspace_mcp::dispatch::ServiceClient;
use google_workspace_mcp::error::{AccountError, ConfigError, Result, WorkspaceMcpError};
use google_workspace_mcp::google::{ClientSettings, Service};

/// In-memory identity provider and token endpoint.
///
/// Identities are keyed by access token; a refresh issues a new access token
/// that maps to the same identity.
#[derive(Default)]
pub struct MockOAuth {
    identities: Mutex<HashMap<String, UserInfo>>,
    refreshes: AtomicUsize,
    fail_refresh: AtomicBool,
    refresh_delay_ms: AtomicU64,
    refresh_scopes: Mutex<Option<Vec<String>>>,
}

impl MockOAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, access_token: &str, email: &str, name: &str) {
        self.identities.lock().unwrap().insert(
            access_token.to_string(),
            UserInfo {
                email: email.to_string(),
                name: name.to_string(),
                picture: String::new(),
            },
        );
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fail_refreshes(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Make every refresh take `delay` before answering
    pub fn delay_refreshes(&self, delay: std::time::Duration) {
        self.refresh_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Scopes reported by subsequent refreshes instead of the current ones
    pub fn refresh_with_scopes(&self, scopes: &[&str]) {
        *self.refresh_scopes.lock().unwrap() = Some(scopes.iter().map(|s| s.to_string()).collect());
    }
}

#[async_trait]
impl OAuthProvider for MockOAuth {
    fn auth_url(&self, redirect_uri: &str, state: &str) -> String {
        format!("https://auth.test/authorize?redirect_uri={}&state={}", redirect_uri, state)
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<Credential> {
        Ok(credential(code, 3600))
    }

    async fn refresh(&self, current: &Credential) -> Result<Credential> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(exchange_failed("refresh rejected"));
        }
        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("{}-r{}", current.access_token, n);

        {
            let mut identities = self.identities.lock().unwrap();
            if let Some(info) = identities.get(&current.access_token).cloned() {
                identities.insert(access_token.clone(), info);
            }
        }
        let scopes = self
            .refresh_scopes
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| current.scopes.clone());

        Ok(Credential {
            access_token,
            refresh_token: current.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            expiry: Some(Utc::now() + Duration::hours(1)),
            scopes,
        })
    }

    async fn user_info(&self, credential: &Credential) -> Result<UserInfo> {
        self.identities
            .lock()
            .unwrap()
            .get(&credential.access_token)
            .cloned()
            .ok_or_else(|| exchange_failed("unknown access token"))
    }

    async fn token_scopes(&self, _credential: &Credential) -> Result<Vec<String>> {
        Ok(vec!["https://www.googleapis.com/auth/drive".to_string()])
    }
}

fn exchange_failed(message: &str) -> WorkspaceMcpError {
    WorkspaceMcpError::Account(AccountError::CredentialExchangeFailed {
        message: message.to_string(),
    })
}

/// A credential for `access_token` that expires `expires_in` seconds from now
pub fn credential(access_token: &str, expires_in: i64) -> Credential {
    Credential {
        access_token: access_token.to_string(),
        refresh_token: Some(format!("{}-refresh", access_token)),
        token_type: "Bearer".to_string(),
        expiry: Some(Utc::now() + Duration::seconds(expires_in)),
        scopes: vec![],
    }
}

pub fn registry(dir: &Path, provider: Arc<MockOAuth>) -> Arc<AccountRegistry> {
    Arc::new(AccountRegistry::new(TokenStore::new(dir), provider))
}

/// Register `email` with the mock and add it to the registry
pub async fn add_account(
    registry: &AccountRegistry,
    provider: &MockOAuth,
    email: &str,
    name: &str,
) -> google_workspace_mcp::accounts::Account {
    let token = format!("tok-{}", email);
    provider.register(&token, email, name);
    registry.add(credential(&token, 3600)).await.unwrap()
}

pub fn settings() -> ClientSettings {
    ClientSettings::new(std::time::Duration::from_secs(5)).unwrap()
}

/// Service client double.
///
/// Accounts whose email starts with `broken` cannot get a client; accounts
/// starting with `fail` get a client whose calls fail.
pub struct FakeClient {
    tokens: Arc<dyn TokenSource>,
}

impl ServiceClient for FakeClient {
    const SERVICE: Service = Service::Drive;

    fn connect(tokens: Arc<dyn TokenSource>, _settings: &ClientSettings) -> Result<Self> {
        if tokens.account().starts_with("broken") {
            return Err(WorkspaceMcpError::Config(ConfigError::InvalidConfig {
                message: "cannot build client".to_string(),
            }));
        }
        Ok(Self { tokens })
    }
}

impl FakeClient {
    pub fn account(&self) -> &str {
        self.tokens.account()
    }

    pub async fn token(&self) -> Result<String> {
        self.tokens.access_token().await
    }

    /// Number of items this account "has": the length of its local part
    pub async fn item_count(&self) -> Result<usize> {
        let account = self.account();
        if account.starts_with("fail") {
            return Err(WorkspaceMcpError::invalid_arguments(format!("{} is down", account)));
        }
        Ok(account.split('@').next().map_or(0, str::len))
    }
}
