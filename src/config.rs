//! Configuration management for the Google Workspace MCP Server
//!
//! Handles paths, the optional JSON config file, and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, WorkspaceMcpError};

/// Default redirect URI registered for the installed-app OAuth client
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

/// Default bound on every outbound HTTP call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration for the Google Workspace MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for configuration files (`config.json`, OAuth keys)
    pub config_dir: PathBuf,

    /// Directory holding one token file per account
    pub accounts_dir: PathBuf,

    /// Path to OAuth keys file (client credentials)
    pub oauth_path: PathBuf,

    /// OAuth application settings
    pub oauth: OAuthSettings,

    /// Which services are exposed as tools
    pub services: ServicesConfig,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Timeout applied to every outbound HTTP call
    pub request_timeout: Duration,
}

/// OAuth application settings shared by every account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthSettings {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub redirect_uri: String,

    /// Legacy single-account token file, read once for migration
    #[serde(default)]
    pub token_file: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Per-service enable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicesConfig {
    pub drive: bool,
    pub gmail: bool,
    pub sheets: bool,
    pub docs: bool,
    pub calendar: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            drive: true,
            gmail: true,
            sheets: true,
            docs: true,
            calendar: true,
        }
    }
}

impl ServicesConfig {
    fn any_enabled(&self) -> bool {
        self.drive || self.gmail || self.sheets || self.docs || self.calendar
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    oauth: Option<OAuthSettings>,
    #[serde(default)]
    services: Option<FileServices>,
    #[serde(default)]
    global: Option<FileGlobal>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServices {
    drive: Option<FileService>,
    gmail: Option<FileService>,
    sheets: Option<FileService>,
    docs: Option<FileService>,
    calendar: Option<FileService>,
}

#[derive(Debug, Deserialize)]
struct FileService {
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FileGlobal {
    log_level: Option<String>,
    timeout: Option<u64>,
}

impl Config {
    /// Load configuration: defaults, then the first config file found, then
    /// environment variables
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            WorkspaceMcpError::Config(ConfigError::DirNotFound {
                path: "~".to_string(),
            })
        })?;

        let mut config = Self::with_dirs(
            home.join(".google-mcp-server"),
            home.join(".google-mcp-accounts"),
        );
        config.oauth.token_file = home
            .join(".google-mcp-token.json")
            .display()
            .to_string();

        let candidates = [
            PathBuf::from("config.json"),
            PathBuf::from("config.local.json"),
            config.config_dir.join("config.json"),
            PathBuf::from("/etc/google-mcp-server/config.json"),
        ];
        if let Some(path) = candidates.iter().find(|p| p.is_file()) {
            config.merge_file(path)?;
            tracing::debug!("Loaded config file {}", path.display());
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        ensure_dir(&config.config_dir)?;
        ensure_dir(&config.accounts_dir)?;

        Ok(config)
    }

    /// Build a default configuration rooted at explicit directories
    pub fn with_dirs(config_dir: PathBuf, accounts_dir: PathBuf) -> Self {
        let oauth_path = config_dir.join("gcp-oauth.keys.json");
        Self {
            config_dir,
            accounts_dir,
            oauth_path,
            oauth: OAuthSettings {
                redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
                scopes: default_scopes(),
                ..OAuthSettings::default()
            },
            services: ServicesConfig::default(),
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Overlay a JSON config file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let file: FileConfig = serde_json::from_str(&content).map_err(|e| {
            WorkspaceMcpError::Config(ConfigError::InvalidFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })?;

        if let Some(oauth) = file.oauth {
            if !oauth.client_id.is_empty() {
                self.oauth.client_id = oauth.client_id;
            }
            if !oauth.client_secret.is_empty() {
                self.oauth.client_secret = oauth.client_secret;
            }
            if !oauth.redirect_uri.is_empty() {
                self.oauth.redirect_uri = oauth.redirect_uri;
            }
            if !oauth.token_file.is_empty() {
                self.oauth.token_file = expand_home(&oauth.token_file);
            }
            if !oauth.scopes.is_empty() {
                self.oauth.scopes = oauth.scopes;
            }
        }

        if let Some(services) = file.services {
            let flag = |svc: Option<FileService>, current: bool| svc.map_or(current, |s| s.enabled);
            self.services.drive = flag(services.drive, self.services.drive);
            self.services.gmail = flag(services.gmail, self.services.gmail);
            self.services.sheets = flag(services.sheets, self.services.sheets);
            self.services.docs = flag(services.docs, self.services.docs);
            self.services.calendar = flag(services.calendar, self.services.calendar);
        }

        if let Some(global) = file.global {
            if let Some(level) = global.log_level {
                self.log_level = level;
            }
            if let Some(secs) = global.timeout.filter(|s| *s > 0) {
                self.request_timeout = Duration::from_secs(secs);
            }
        }

        Ok(())
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("GOOGLE_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = non_empty("GOOGLE_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = non_empty("GOOGLE_REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = non_empty("GOOGLE_TOKEN_FILE") {
            self.oauth.token_file = expand_home(&v);
        }
        if let Some(v) = non_empty("GOOGLE_MCP_ACCOUNTS_DIR") {
            self.accounts_dir = PathBuf::from(expand_home(&v));
        }
        if let Some(v) = non_empty("GOOGLE_OAUTH_PATH") {
            self.oauth_path = PathBuf::from(expand_home(&v));
        }
        if let Some(v) = non_empty("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(secs) = non_empty("GOOGLE_MCP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            self.request_timeout = Duration::from_secs(secs);
        }

        let disabled = |key: &str| lookup(key).as_deref() == Some("true");
        if disabled("DISABLE_DRIVE") {
            self.services.drive = false;
        }
        if disabled("DISABLE_GMAIL") {
            self.services.gmail = false;
        }
        if disabled("DISABLE_SHEETS") {
            self.services.sheets = false;
        }
        if disabled("DISABLE_DOCS") {
            self.services.docs = false;
        }
        if disabled("DISABLE_CALENDAR") {
            self.services.calendar = false;
        }
    }

    /// Reject configurations that would expose nothing
    pub fn validate(&self) -> Result<()> {
        if !self.services.any_enabled() {
            return Err(WorkspaceMcpError::Config(ConfigError::InvalidConfig {
                message: "at least one service must be enabled".to_string(),
            }));
        }
        Ok(())
    }

    /// Path of the legacy single-account token file, if configured
    pub fn legacy_token_path(&self) -> Option<PathBuf> {
        if self.oauth.token_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.oauth.token_file))
        }
    }

    /// Check if OAuth keys file exists
    pub fn oauth_keys_exist(&self) -> bool {
        self.oauth_path.exists()
    }
}

/// Scopes requested when the config does not name any
pub fn default_scopes() -> Vec<String> {
    [
        "https://www.googleapis.com/auth/drive",
        "https://www.googleapis.com/auth/gmail.modify",
        "https://www.googleapis.com/auth/spreadsheets",
        "https://www.googleapis.com/auth/documents",
        "https://www.googleapis.com/auth/calendar",
        "https://www.googleapis.com/auth/userinfo.email",
        "https://www.googleapis.com/auth/userinfo.profile",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Create `dir` (mode 0700 on Unix) if it does not exist
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(dir).map_err(|_| {
        WorkspaceMcpError::Config(ConfigError::DirCreationFailed {
            path: dir.display().to_string(),
        })
    })
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).display().to_string(),
        _ => path.to_string(),
    }
}

/// Google API constants
pub mod google {
    /// OAuth authorization endpoint
    pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

    /// OAuth token endpoint
    pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

    /// Token introspection endpoint
    pub const TOKEN_INFO_URI: &str = "https://oauth2.googleapis.com/tokeninfo";

    /// Identity endpoint
    pub const USERINFO_URI: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

    pub const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
    pub const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
    pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
    pub const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";
    pub const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> Config {
        Config::with_dirs(PathBuf::from("/tmp/cfg"), PathBuf::from("/tmp/accounts"))
    }

    #[test]
    fn test_default_scopes() {
        let config = test_config();
        assert_eq!(config.oauth.scopes.len(), 7);
        assert!(config.oauth.scopes[0].contains("drive"));
        assert_eq!(config.oauth.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_CLIENT_ID", "id-from-env"),
            ("GOOGLE_CLIENT_SECRET", "secret-from-env"),
            ("DISABLE_GMAIL", "true"),
            ("DISABLE_DOCS", "false"),
            ("DISABLE_CALENDAR", "true"),
            ("GOOGLE_MCP_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = test_config();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.oauth.client_id, "id-from-env");
        assert_eq!(config.oauth.client_secret, "secret-from-env");
        assert!(!config.services.gmail);
        assert!(config.services.docs);
        assert!(!config.services.calendar);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_validate_requires_a_service() {
        let mut config = test_config();
        config.services = ServicesConfig {
            drive: false,
            gmail: false,
            sheets: false,
            docs: false,
            calendar: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "oauth": {"client_id": "file-id", "client_secret": "file-secret"},
                "services": {"sheets": {"enabled": false}},
                "global": {"log_level": "debug", "timeout": 4}
            }"#,
        )
        .unwrap();

        let mut config = test_config();
        config.merge_file(&path).unwrap();

        assert_eq!(config.oauth.client_id, "file-id");
        assert!(!config.services.sheets);
        assert!(config.services.drive);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.request_timeout, Duration::from_secs(4));
        assert_eq!(config.oauth.scopes, default_scopes());
    }

    #[test]
    fn test_merge_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut config = test_config();
        assert!(config.merge_file(&path).is_err());
    }
}
