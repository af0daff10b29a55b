//! Google Workspace MCP Server
//!
//! A Model Context Protocol server for Drive, Gmail, Sheets, Docs and
//! Calendar across several Google accounts.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use google_workspace_mcp::accounts::{AccountRegistry, TokenStore};
use google_workspace_mcp::auth::callback::authenticate_interactive;
use google_workspace_mcp::auth::{GoogleOAuth, LegacyTokenSource, OAuthProvider, TokenSource};
use google_workspace_mcp::config::Config;
use google_workspace_mcp::dispatch::{AccountEvictor, ClientPool, Dispatcher, ServiceClient};
use google_workspace_mcp::error::Result;
use google_workspace_mcp::google::calendar::CalendarClient;
use google_workspace_mcp::google::docs::DocsClient;
use google_workspace_mcp::google::drive::DriveClient;
use google_workspace_mcp::google::gmail::GmailClient;
use google_workspace_mcp::google::sheets::SheetsClient;
use google_workspace_mcp::google::ClientSettings;
use google_workspace_mcp::handlers::{
    AccountsHandler, CalendarHandler, DocsHandler, DriveHandler, GmailHandler, SheetsHandler,
};
use google_workspace_mcp::mcp::{McpServer, ServiceHandler};

/// Google Workspace MCP Server
#[derive(Parser)]
#[command(name = "google-workspace-mcp")]
#[command(author, version, about = "Google Workspace MCP Server - Drive, Gmail, Sheets, Docs and Calendar over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,

    /// Add a Google account through the browser
    Auth {
        /// Redirect URI registered for the OAuth client
        #[arg(long)]
        redirect_uri: Option<String>,
    },

    /// Manage stored accounts
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
}

#[derive(Subcommand)]
enum AccountsCommand {
    /// List stored accounts
    List,

    /// Remove an account and delete its token file
    Remove { email: String },

    /// Refresh an account's access token
    Refresh { email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::Auth { redirect_uri } => {
            let provider = oauth_provider(&config);
            let registry = open_registry(&config, provider.clone()).await;
            let redirect_uri = redirect_uri.unwrap_or_else(|| config.oauth.redirect_uri.clone());

            let account = authenticate_interactive(provider.as_ref(), &registry, &redirect_uri).await?;
            registry.flush().await;
            eprintln!("Authenticated {} successfully!", account.email);
            Ok(())
        }
        Commands::Accounts { command } => {
            let provider = oauth_provider(&config);
            let registry = open_registry(&config, provider).await;
            let outcome = run_accounts_command(&registry, command).await;
            registry.flush().await;
            outcome
        }
    }
}

async fn run_accounts_command(registry: &AccountRegistry, command: AccountsCommand) -> Result<()> {
    match command {
        AccountsCommand::List => {
            let mut accounts = registry.list().await;
            if accounts.is_empty() {
                println!("No accounts. Run 'google-workspace-mcp auth' to add one.");
                return Ok(());
            }
            accounts.sort_by(|a, b| b.last_used.cmp(&a.last_used));
            for account in accounts {
                println!(
                    "{}\t{}\t{}\tlast used {}",
                    account.email,
                    if account.name.is_empty() { "-" } else { account.name.as_str() },
                    if account.is_active() { "active" } else { "expired" },
                    account.last_used.to_rfc3339()
                );
            }
        }
        AccountsCommand::Remove { email } => {
            let removed = registry.remove(&email).await?;
            println!("Removed {}", removed.email);
        }
        AccountsCommand::Refresh { email } => {
            let account = registry.refresh(&email).await?;
            match account.token.expiry {
                Some(expiry) => println!("Refreshed {} (expires {})", account.email, expiry.to_rfc3339()),
                None => println!("Refreshed {}", account.email),
            }
        }
    }
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    config.validate()?;

    let provider = oauth_provider(&config);
    let registry = open_registry(&config, provider.clone()).await;

    // The legacy token only serves requests while no account is registered
    let legacy = if registry.is_empty().await {
        legacy_token_source(&config, provider)
    } else {
        None
    };
    if registry.is_empty().await && legacy.is_none() {
        tracing::warn!("No accounts configured; use the accounts_add tool or run 'google-workspace-mcp auth'");
    }

    let settings = ClientSettings::new(config.request_timeout)?;
    let fan_out_timeout = config.request_timeout;

    let mut handlers: Vec<Arc<dyn ServiceHandler>> = Vec::new();
    let mut evictors: Vec<Arc<dyn AccountEvictor>> = Vec::new();

    if config.services.drive {
        let dispatcher =
            build_dispatcher::<DriveClient>(&registry, &settings, fan_out_timeout, legacy.as_ref()).await?;
        evictors.push(dispatcher.pool().clone());
        handlers.push(Arc::new(DriveHandler::new(dispatcher)));
    }
    if config.services.gmail {
        let dispatcher =
            build_dispatcher::<GmailClient>(&registry, &settings, fan_out_timeout, legacy.as_ref()).await?;
        evictors.push(dispatcher.pool().clone());
        handlers.push(Arc::new(GmailHandler::new(dispatcher)));
    }
    if config.services.sheets {
        let dispatcher =
            build_dispatcher::<SheetsClient>(&registry, &settings, fan_out_timeout, legacy.as_ref()).await?;
        evictors.push(dispatcher.pool().clone());
        handlers.push(Arc::new(SheetsHandler::new(dispatcher)));
    }
    if config.services.docs {
        let dispatcher =
            build_dispatcher::<DocsClient>(&registry, &settings, fan_out_timeout, legacy.as_ref()).await?;
        evictors.push(dispatcher.pool().clone());
        handlers.push(Arc::new(DocsHandler::new(dispatcher)));
    }
    if config.services.calendar {
        let dispatcher =
            build_dispatcher::<CalendarClient>(&registry, &settings, fan_out_timeout, legacy.as_ref()).await?;
        evictors.push(dispatcher.pool().clone());
        handlers.push(Arc::new(CalendarHandler::new(dispatcher)));
    }

    let accounts = AccountsHandler::new(registry.clone(), config.oauth.redirect_uri.clone())
        .with_evictors(evictors);
    handlers.insert(0, Arc::new(accounts));

    tracing::info!("Starting MCP server with {} handler(s)", handlers.len());
    let mut server = McpServer::new(handlers);
    let outcome = server.run_stdio().await;

    registry.flush().await;
    outcome
}

/// Pool and dispatcher for one service; `legacy` backs the default client
async fn build_dispatcher<C: ServiceClient>(
    registry: &Arc<AccountRegistry>,
    settings: &ClientSettings,
    timeout: Duration,
    legacy: Option<&Arc<dyn TokenSource>>,
) -> Result<Dispatcher<C>> {
    let pool = Arc::new(ClientPool::<C>::new(registry.clone(), settings.clone()).await);
    tracing::info!("{} ready for {} account(s)", C::SERVICE.title(), pool.len().await);

    let mut dispatcher = Dispatcher::new(registry.clone(), pool, timeout);
    if let Some(tokens) = legacy {
        dispatcher = dispatcher.with_default_client(Arc::new(C::connect(tokens.clone(), settings)?));
    }
    Ok(dispatcher)
}

fn oauth_provider(config: &Config) -> Arc<dyn OAuthProvider> {
    match GoogleOAuth::from_config(config) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Place gcp-oauth.keys.json in the current directory or {}, or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET.",
                config.config_dir.display()
            );
            std::process::exit(1);
        }
    }
}

async fn open_registry(config: &Config, provider: Arc<dyn OAuthProvider>) -> Arc<AccountRegistry> {
    let store = TokenStore::new(&config.accounts_dir);
    let legacy = config.legacy_token_path();
    AccountRegistry::open(store, provider, legacy.as_deref()).await
}

fn legacy_token_source(config: &Config, provider: Arc<dyn OAuthProvider>) -> Option<Arc<dyn TokenSource>> {
    let path = config.legacy_token_path()?;
    match LegacyTokenSource::load(provider, &path) {
        Ok(Some(source)) => {
            tracing::info!("Using legacy token {} as the default account", path.display());
            Some(Arc::new(source))
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Could not read legacy token {}: {}", path.display(), e);
            None
        }
    }
}
