//! Account and credential records
//!
//! These are the on-disk shape of a token file as well as the in-memory
//! registry entries.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Refresh a credential this long before it actually expires
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// OAuth credential (access/refresh token pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token
    pub access_token: String,

    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Absolute expiry; `None` when the provider did not report one
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,

    /// Scopes granted to this token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// Token files written by older tooling use the zero time ("0001-01-01T00:00:00Z")
// for "no expiry".
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
    Ok(value.filter(|t| t.timestamp() > 0))
}

impl Credential {
    /// Build a credential from a token-endpoint response received at `now`
    pub fn from_token_response(
        access_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: Option<i64>,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type,
            expiry: expires_in.map(|secs| now + Duration::seconds(secs)),
            scopes: scope.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// A credential is valid while its expiry lies in the future. A token
    /// without a known expiry is valid as long as it has an access token.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        self.expiry.map_or(true, |expiry| expiry > now)
    }

    /// Whether the credential should be refreshed before its next use
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - now < Duration::seconds(EXPIRY_MARGIN_SECS),
            None => self.access_token.is_empty(),
        }
    }
}

/// Identity returned by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub picture: String,
}

/// A single authenticated Google account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account email, the registry key
    #[serde(default)]
    pub email: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Profile picture URL
    #[serde(default)]
    pub picture: String,

    /// Current credential
    pub token: Credential,

    /// Last time this account was selected for a call
    #[serde(default)]
    pub last_used: DateTime<Utc>,

    /// Token file backing this account
    #[serde(default)]
    pub token_file: PathBuf,
}

impl Account {
    /// Create an account from a freshly fetched identity
    pub fn new(info: UserInfo, token: Credential, token_file: PathBuf) -> Self {
        Self {
            email: info.email,
            name: info.name,
            picture: info.picture,
            token,
            last_used: Utc::now(),
            token_file,
        }
    }

    /// Domain part of the email address
    pub fn domain(&self) -> Option<&str> {
        self.email.split_once('@').map(|(_, domain)| domain)
    }

    /// Bump `last_used` to `now`, never moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_used {
            self.last_used = now;
        }
    }

    /// Whether the account currently holds a valid credential
    pub fn is_active(&self) -> bool {
        self.token.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expiry: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expiry,
            scopes: vec![],
        }
    }

    #[test]
    fn test_validity_follows_expiry() {
        let now = Utc::now();
        assert!(credential(Some(now + Duration::hours(1))).is_valid_at(now));
        assert!(!credential(Some(now - Duration::seconds(1))).is_valid_at(now));
        assert!(credential(None).is_valid_at(now));
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = Utc::now();
        assert!(credential(Some(now + Duration::seconds(60))).needs_refresh_at(now));
        assert!(!credential(Some(now + Duration::hours(1))).needs_refresh_at(now));
        assert!(!credential(None).needs_refresh_at(now));
    }

    #[test]
    fn test_legacy_token_format() {
        let json = r#"{
            "access_token": "ya29.token",
            "token_type": "Bearer",
            "refresh_token": "1//refresh",
            "expiry": "0001-01-01T00:00:00Z"
        }"#;
        let cred: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.access_token, "ya29.token");
        assert_eq!(cred.refresh_token.as_deref(), Some("1//refresh"));
        assert!(cred.expiry.is_none());
    }

    #[test]
    fn test_from_token_response_splits_scopes() {
        let now = Utc::now();
        let cred = Credential::from_token_response(
            "a".to_string(),
            None,
            "Bearer".to_string(),
            Some(3600),
            "https://www.googleapis.com/auth/drive openid",
            now,
        );
        assert_eq!(cred.scopes.len(), 2);
        assert_eq!(cred.expiry, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut account = Account::new(
            UserInfo {
                email: "a@x.com".to_string(),
                ..UserInfo::default()
            },
            credential(None),
            PathBuf::from("a.json"),
        );
        let later = account.last_used + Duration::seconds(5);
        account.touch(later);
        account.touch(later - Duration::seconds(30));
        assert_eq!(account.last_used, later);
        assert_eq!(account.domain(), Some("x.com"));
    }
}
