//! OAuth 2.0 exchange against Google
//!
//! Handles:
//! - Loading client credentials
//! - Authorization URL generation and code exchange
//! - Token refresh
//! - Identity and token-info lookups

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::accounts::types::{Credential, UserInfo};
use crate::config::{google, Config};
use crate::error::{AccountError, AuthError, Result, WorkspaceMcpError};

/// OAuth client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthKeys {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Auth URI
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    /// Token URI
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    google::AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    google::TOKEN_URI.to_string()
}

/// OAuth keys file format (can be "installed" or "web")
#[derive(Debug, Deserialize)]
struct OAuthKeysFile {
    #[serde(alias = "web")]
    installed: Option<OAuthKeys>,
}

impl OAuthKeys {
    /// Resolve client credentials: explicit settings win, otherwise the
    /// downloaded keys file
    pub fn resolve(config: &Config) -> Result<Self> {
        if !config.oauth.client_id.is_empty() && !config.oauth.client_secret.is_empty() {
            return Ok(Self {
                client_id: config.oauth.client_id.clone(),
                client_secret: config.oauth.client_secret.clone(),
                auth_uri: default_auth_uri(),
                token_uri: default_token_uri(),
            });
        }

        if config.oauth_keys_exist() {
            return Self::load(&config.oauth_path);
        }

        Err(WorkspaceMcpError::Auth(AuthError::MissingClientCredentials))
    }

    /// Load OAuth keys from file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WorkspaceMcpError::Auth(AuthError::KeysFileNotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path)?;
        let keys_file: OAuthKeysFile = serde_json::from_str(&content)?;

        keys_file
            .installed
            .ok_or(WorkspaceMcpError::Auth(AuthError::InvalidKeysFormat))
    }
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    scope: String,
}

/// The OAuth operations the account layer depends on.
///
/// Everything that talks to Google's token or identity endpoints goes
/// through this trait so the registry can be exercised without a network.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Build the authorization URL for `redirect_uri`. `state` is echoed
    /// back on the redirect and must be checked there.
    fn auth_url(&self, redirect_uri: &str, state: &str) -> String;

    /// Exchange an authorization code for a credential
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credential>;

    /// Exchange the refresh token of `credential` for a new credential
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Look up the identity that owns `credential`
    async fn user_info(&self, credential: &Credential) -> Result<UserInfo>;

    /// Scopes actually granted to `credential`
    async fn token_scopes(&self, credential: &Credential) -> Result<Vec<String>>;
}

/// Google implementation of [`OAuthProvider`]
pub struct GoogleOAuth {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth client credentials
    keys: OAuthKeys,

    /// Scopes requested during authorization
    scopes: Vec<String>,
}

impl GoogleOAuth {
    /// Create a new provider
    pub fn new(keys: OAuthKeys, scopes: Vec<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            keys,
            scopes,
        })
    }

    /// Create a provider from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = OAuthKeys::resolve(config)?;
        Self::new(keys, config.oauth.scopes.clone(), config.request_timeout)
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(&self.keys.token_uri)
            .form(params)
            .send()
            .await
            .map_err(exchange_failed)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(exchange_failed(format!("token endpoint returned {}: {}", status, text)));
        }

        response.json().await.map_err(exchange_failed)
    }
}

fn exchange_failed(err: impl std::fmt::Display) -> WorkspaceMcpError {
    WorkspaceMcpError::Account(AccountError::CredentialExchangeFailed {
        message: err.to_string(),
    })
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn auth_url(&self, redirect_uri: &str, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.keys.auth_uri,
            urlencoding::encode(&self.keys.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credential> {
        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let token = self.post_token(&params).await?;

        Ok(Credential::from_token_response(
            token.access_token,
            token.refresh_token,
            token.token_type,
            token.expires_in,
            &token.scope,
            Utc::now(),
        ))
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| exchange_failed("no refresh token available"))?;

        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token = self.post_token(&params).await?;

        let mut refreshed = Credential::from_token_response(
            token.access_token,
            token.refresh_token.or_else(|| Some(refresh_token.to_string())),
            token.token_type,
            token.expires_in,
            &token.scope,
            Utc::now(),
        );
        if refreshed.scopes.is_empty() {
            refreshed.scopes = credential.scopes.clone();
        }

        Ok(refreshed)
    }

    async fn user_info(&self, credential: &Credential) -> Result<UserInfo> {
        let response = self
            .http_client
            .get(google::USERINFO_URI)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(exchange_failed)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(exchange_failed(format!("failed to get user info ({}): {}", status, text)));
        }

        response.json().await.map_err(exchange_failed)
    }

    async fn token_scopes(&self, credential: &Credential) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(google::TOKEN_INFO_URI)
            .query(&[("access_token", credential.access_token.as_str())])
            .send()
            .await
            .map_err(exchange_failed)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(exchange_failed(format!("failed to get token info: {}", text)));
        }

        let info: TokenInfo = response.json().await.map_err(exchange_failed)?;
        Ok(info.scope.split_whitespace().map(str::to_string).collect())
    }
}
