//! Error types for the Google Workspace MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the Google Workspace MCP Server
#[derive(Error, Debug)]
pub enum WorkspaceMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Account registry and resolution errors
    #[error("{0}")]
    Account(#[from] AccountError),

    /// Google API errors
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth keys file not found: {path}")]
    KeysFileNotFound { path: String },

    #[error("Invalid OAuth keys format: expected 'installed' or 'web' credentials")]
    InvalidKeysFormat,

    #[error("OAuth client ID and client secret are required")]
    MissingClientCredentials,

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("No authorization code provided")]
    NoAuthCode,

    #[error("Authentication timed out after {secs} seconds")]
    Timeout { secs: u64 },
}

/// Errors raised by the account registry, the context resolver and the
/// per-service client pools
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("account not found: {email}")]
    NotFound { email: String },

    #[error("no authenticated accounts available")]
    NoAccounts,

    #[error("multiple accounts available, please specify: {}", .candidates.join(", "))]
    AmbiguousAccount { candidates: Vec<String> },

    #[error("credential exchange failed: {message}")]
    CredentialExchangeFailed { message: String },

    #[error("failed to create {service} client for {email}: {message}")]
    ClientConstructionFailed {
        service: String,
        email: String,
        message: String,
    },
}

/// Google API errors
///
/// `UpstreamCallFailed` carries the raw upstream response; the remaining
/// variants are the actionable rewrites produced by
/// [`crate::auth::remediation::remediate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{service} API request failed ({status}): {message}")]
    UpstreamCallFailed {
        service: String,
        status: u16,
        message: String,
    },

    #[error(
        "Missing required OAuth scopes for {service} service.\n\
         Account: {account}\n\
         Missing scopes: {}\n\n\
         To fix this:\n\
         1. Run: accounts_refresh\n\
         2. Select account: {account}\n\
         3. Authorize the required scopes",
        .missing.join(", ")
    )]
    MissingScopes {
        service: String,
        account: String,
        missing: Vec<String>,
    },

    #[error(
        "Google {service} API is not enabled for this project.\n\n\
         Account: {account}\n\n\
         To fix this:\n\
         1. Enable the API at: {enable_url}\n\
         2. Wait a few minutes for the change to propagate\n\
         3. Re-authenticate using: accounts_refresh\n\
         4. Select account: {account}"
    )]
    ApiDisabled {
        service: String,
        account: String,
        enable_url: String,
    },

    #[error(
        "Insufficient permissions for {service} API.\n\n\
         Account: {account}\n\n\
         This error usually means:\n\
         - Missing required OAuth scopes\n\
         - API not enabled in your project\n\
         - Account doesn't have access to the resource\n\n\
         To fix this:\n\
         1. Run: accounts_refresh\n\
         2. Select account: {account}\n\
         3. Authorize all requested permissions"
    )]
    InsufficientPermissions { service: String, account: String },

    #[error("{service} request timed out after {secs} seconds")]
    Timeout { service: String, secs: u64 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found: {path}")]
    DirNotFound { path: String },

    #[error("Failed to create config directory: {path}")]
    DirCreationFailed { path: String },

    #[error("Failed to parse config file {path}: {message}")]
    InvalidFile { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for Google Workspace MCP operations
pub type Result<T> = std::result::Result<T, WorkspaceMcpError>;

impl WorkspaceMcpError {
    /// Shorthand for argument deserialization failures
    pub fn invalid_arguments(err: impl std::fmt::Display) -> Self {
        WorkspaceMcpError::Mcp(McpError::InvalidArguments {
            message: err.to_string(),
        })
    }

    /// The account error carried by this error, if any
    pub fn as_account_error(&self) -> Option<&AccountError> {
        match self {
            WorkspaceMcpError::Account(err) => Some(err),
            _ => None,
        }
    }
}
