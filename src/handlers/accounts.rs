//! Account management tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::accounts::registry::AccountRegistry;
use crate::accounts::types::Account;
use crate::auth::callback::{PendingAuthorization, CALLBACK_TIMEOUT};
use crate::dispatch::pool::AccountEvictor;
use crate::error::{McpError, Result, ValidationError, WorkspaceMcpError};
use crate::mcp::tools::{object_schema, parse_args, resource_def, tool_def, unknown_tool, ServiceHandler};
use crate::mcp::types::{Resource, Tool};

const ACCOUNTS_LIST_URI: &str = "accounts://list";

#[derive(Debug, Deserialize, Validate)]
struct EmailArgs {
    #[validate(email)]
    email: String,
}

#[derive(Debug, Deserialize, Validate)]
struct OptionalEmailArgs {
    #[validate(email)]
    email: Option<String>,
}

fn invalid_email(email: &str) -> WorkspaceMcpError {
    WorkspaceMcpError::Validation(ValidationError::InvalidEmail {
        email: email.to_string(),
    })
}

/// Tools for listing, adding, removing and refreshing accounts
pub struct AccountsHandler {
    registry: Arc<AccountRegistry>,
    redirect_uri: String,
    evictors: Vec<Arc<dyn AccountEvictor>>,
}

impl AccountsHandler {
    pub fn new(registry: Arc<AccountRegistry>, redirect_uri: impl Into<String>) -> Self {
        Self {
            registry,
            redirect_uri: redirect_uri.into(),
            evictors: Vec::new(),
        }
    }

    /// Caches to clear when an account is removed
    pub fn with_evictors(mut self, evictors: Vec<Arc<dyn AccountEvictor>>) -> Self {
        self.evictors = evictors;
        self
    }

    async fn list(&self) -> Value {
        let mut accounts = self.registry.list().await;
        accounts.sort_by(|a, b| b.last_used.cmp(&a.last_used).then_with(|| a.email.cmp(&b.email)));

        let entries: Vec<Value> = accounts
            .iter()
            .map(|a| {
                json!({
                    "email": a.email,
                    "name": a.name,
                    "active": a.is_active(),
                    "last_used": a.last_used.to_rfc3339(),
                })
            })
            .collect();

        json!({
            "accounts": entries,
            "count": accounts.len(),
        })
    }

    async fn details(&self, args: Value) -> Result<Value> {
        let args: OptionalEmailArgs = parse_args(args)?;
        if args.validate().is_err() {
            return Err(invalid_email(args.email.as_deref().unwrap_or_default()));
        }

        match args.email {
            Some(email) => {
                let account = self.registry.lookup(&email).await?;
                Ok(account_details(&account))
            }
            None => {
                let accounts: Vec<Value> = self
                    .registry
                    .list()
                    .await
                    .iter()
                    .map(account_details)
                    .collect();
                Ok(json!({ "count": accounts.len(), "accounts": accounts }))
            }
        }
    }

    async fn add(&self) -> Result<Value> {
        let provider = self.registry.provider();
        let pending = PendingAuthorization::start(provider.as_ref(), &self.redirect_uri).await?;

        let auth_url = pending.auth_url.clone();
        let redirect_uri = pending.redirect_uri.clone();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            match pending
                .complete(provider.as_ref(), &registry, CALLBACK_TIMEOUT)
                .await
            {
                Ok(account) => tracing::info!("Account {} authorized", account.email),
                Err(e) => tracing::warn!("Account authorization did not complete: {}", e),
            }
        });

        Ok(json!({
            "auth_url": auth_url,
            "redirect_uri": redirect_uri,
            "timeout_seconds": CALLBACK_TIMEOUT.as_secs(),
            "instructions": format!(
                "Open the auth_url in a browser and approve access. The account is added as soon as the browser is redirected to {}. Run accounts_list afterwards to confirm.",
                redirect_uri
            ),
        }))
    }

    async fn remove(&self, args: Value) -> Result<Value> {
        let args: EmailArgs = parse_args(args)?;
        if args.validate().is_err() {
            return Err(invalid_email(&args.email));
        }

        let removed = self.registry.remove(&args.email).await?;
        for evictor in &self.evictors {
            evictor.evict(&removed.email).await;
        }

        Ok(json!({
            "removed": removed.email,
            "remaining": self.registry.emails().await,
        }))
    }

    async fn refresh(&self, args: Value) -> Result<Value> {
        let args: EmailArgs = parse_args(args)?;
        if args.validate().is_err() {
            return Err(invalid_email(&args.email));
        }

        let account = self.registry.refresh(&args.email).await?;
        Ok(json!({
            "email": account.email,
            "refreshed": true,
            "expiry": account.token.expiry.map(|t| t.to_rfc3339()),
        }))
    }
}

fn account_details(account: &Account) -> Value {
    json!({
        "email": account.email,
        "name": account.name,
        "picture": account.picture,
        "active": account.is_active(),
        "expiry": account.token.expiry.map(|t| t.to_rfc3339()),
        "has_refresh_token": account.token.refresh_token.as_deref().is_some_and(|t| !t.is_empty()),
        "scopes": account.token.scopes,
        "last_used": account.last_used.to_rfc3339(),
        "token_file": account.token_file.display().to_string(),
    })
}

#[async_trait]
impl ServiceHandler for AccountsHandler {
    fn tools(&self) -> Vec<Tool> {
        let email_schema = |description: &str| {
            object_schema(
                json!({ "email": { "type": "string", "description": description } }),
                &["email"],
            )
        };

        vec![
            tool_def(
                "accounts_list",
                "List authenticated Google accounts, most recently used first",
                object_schema(json!({}), &[]),
            ),
            tool_def(
                "accounts_details",
                "Show credential details (expiry, scopes) for one account or all accounts",
                object_schema(
                    json!({ "email": { "type": "string", "description": "Account email; omit for all accounts" } }),
                    &[],
                ),
            ),
            tool_def(
                "accounts_add",
                "Start authorizing a new Google account; returns a URL to open in a browser",
                object_schema(json!({}), &[]),
            ),
            tool_def(
                "accounts_remove",
                "Remove an account and delete its stored credential",
                email_schema("Email of the account to remove"),
            ),
            tool_def(
                "accounts_refresh",
                "Refresh the access token of an account",
                email_schema("Email of the account to refresh"),
            ),
        ]
    }

    fn resources(&self) -> Vec<Resource> {
        vec![resource_def(
            ACCOUNTS_LIST_URI,
            "Accounts",
            "Authenticated Google accounts",
        )]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "accounts_list" => Ok(self.list().await),
            "accounts_details" => self.details(arguments).await,
            "accounts_add" => self.add().await,
            "accounts_remove" => self.remove(arguments).await,
            "accounts_refresh" => self.refresh(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        match uri {
            ACCOUNTS_LIST_URI => Ok(self.list().await),
            _ => Err(WorkspaceMcpError::Mcp(McpError::UnknownResource {
                uri: uri.to_string(),
            })),
        }
    }
}
