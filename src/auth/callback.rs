//! Browser-based authorization with a local callback server
//!
//! A small axum server receives the redirect from Google's consent screen,
//! hands the authorization code back, and shuts itself down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;

use crate::accounts::registry::AccountRegistry;
use crate::accounts::types::Account;
use crate::auth::oauth::OAuthProvider;
use crate::error::{AuthError, Result, WorkspaceMcpError};

/// How long to wait for the user to finish the consent screen
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

type CodeSender = Arc<Mutex<Option<oneshot::Sender<std::result::Result<String, String>>>>>;

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful!</h1><p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Authentication failed</h1><p>Authorization was not completed. See the server log for details.</p></body></html>";
const STATE_MISMATCH_PAGE: &str = "<html><body><h1>Authentication failed</h1><p>This response does not belong to a pending authorization.</p></body></html>";

/// Build the router that receives the OAuth redirect on `path`.
///
/// Requests whose `state` differs from `expected_state` are rejected and do
/// not end the pending authorization.
pub fn callback_router(
    path: &str,
    expected_state: String,
    sender: oneshot::Sender<std::result::Result<String, String>>,
) -> Router {
    let sender: CodeSender = Arc::new(Mutex::new(Some(sender)));
    let expected_state = Arc::new(expected_state);

    let handler = move |Query(params): Query<HashMap<String, String>>| {
        let sender = sender.clone();
        let expected_state = expected_state.clone();
        async move {
            if params.get("state").map(String::as_str) != Some(expected_state.as_str()) {
                tracing::warn!("Ignoring OAuth callback with unexpected state");
                return (StatusCode::BAD_REQUEST, Html(STATE_MISMATCH_PAGE));
            }

            let outcome = match params.get("code") {
                Some(code) if !code.is_empty() => Ok(code.clone()),
                _ => Err(params
                    .get("error")
                    .cloned()
                    .unwrap_or_else(|| "no authorization code received".to_string())),
            };

            let page = match &outcome {
                Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
                Err(message) => {
                    tracing::warn!("OAuth callback reported an error: {}", message);
                    (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
                }
            };

            if let Ok(mut guard) = sender.lock() {
                if let Some(tx) = guard.take() {
                    let _ = tx.send(outcome);
                }
            }

            page
        }
    };

    Router::new().route(path, get(handler))
}

/// A running callback server waiting for the consent redirect
pub struct PendingAuthorization {
    /// URL the user must open
    pub auth_url: String,

    /// Redirect URI actually registered with the callback server
    pub redirect_uri: String,

    code_rx: oneshot::Receiver<std::result::Result<String, String>>,
    shutdown_tx: oneshot::Sender<()>,
}

impl PendingAuthorization {
    /// Bind the callback server and produce the authorization URL.
    ///
    /// The port comes from `redirect_uri`; if it is taken a random port is
    /// used and the redirect URI is rewritten to match.
    pub async fn start(provider: &dyn OAuthProvider, redirect_uri: &str) -> Result<Self> {
        let mut url = reqwest::Url::parse(redirect_uri).map_err(|e| callback_error(e))?;
        let port = url.port_or_known_default().unwrap_or(8080);
        let path = url.path().to_string();

        let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!("Callback port {} unavailable ({}), using a random port", port, e);
                tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?
            }
        };
        let actual_port = listener.local_addr()?.port();
        if actual_port != port {
            url.set_port(Some(actual_port))
                .map_err(|_| callback_error("cannot set port on redirect URI"))?;
        }
        let redirect_uri = url.to_string();

        let state = uuid::Uuid::new_v4().simple().to_string();
        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = callback_router(&path, state.clone(), code_tx);

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::error!("OAuth callback server failed: {}", e);
            }
        });

        Ok(Self {
            auth_url: provider.auth_url(&redirect_uri, &state),
            redirect_uri,
            code_rx,
            shutdown_tx,
        })
    }

    /// Wait for the redirect and return the authorization code
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        let outcome = tokio::time::timeout(timeout, self.code_rx).await;
        let _ = self.shutdown_tx.send(());

        match outcome {
            Err(_) => Err(WorkspaceMcpError::Auth(AuthError::Timeout {
                secs: timeout.as_secs(),
            })),
            Ok(Err(_)) => Err(WorkspaceMcpError::Auth(AuthError::NoAuthCode)),
            Ok(Ok(Err(message))) => Err(callback_error(message)),
            Ok(Ok(Ok(code))) => Ok(code),
        }
    }

    /// Wait for the redirect, exchange the code and register the account
    pub async fn complete(
        self,
        provider: &dyn OAuthProvider,
        registry: &AccountRegistry,
        timeout: Duration,
    ) -> Result<Account> {
        let redirect_uri = self.redirect_uri.clone();
        let code = self.wait_for_code(timeout).await?;
        tracing::info!("Received authorization code, exchanging for tokens...");
        let credential = provider.exchange_code(&code, &redirect_uri).await?;
        registry.add(credential).await
    }
}

fn callback_error(err: impl std::fmt::Display) -> WorkspaceMcpError {
    WorkspaceMcpError::Auth(AuthError::CallbackError {
        message: err.to_string(),
    })
}

/// Run the interactive flow from a terminal: print the URL, try to open a
/// browser, and block until the account is registered
pub async fn authenticate_interactive(
    provider: &dyn OAuthProvider,
    registry: &AccountRegistry,
    redirect_uri: &str,
) -> Result<Account> {
    let pending = PendingAuthorization::start(provider, redirect_uri).await?;

    eprintln!("\nPlease visit this URL to authenticate:");
    eprintln!("{}\n", pending.auth_url);

    if let Err(e) = open::that(&pending.auth_url) {
        eprintln!("Could not open browser automatically: {}", e);
        eprintln!("Please open the URL manually.");
    }

    eprintln!(
        "Waiting for authentication callback on {} (timeout: {} minutes)...",
        pending.redirect_uri,
        CALLBACK_TIMEOUT.as_secs() / 60
    );

    pending.complete(provider, registry, CALLBACK_TIMEOUT).await
}
