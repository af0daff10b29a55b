//! On-disk token store
//!
//! One JSON file per account, named after the account's email, readable only
//! by the owning user.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::accounts::types::{Account, Credential};
use crate::config::ensure_dir;
use crate::error::Result;

/// Directory of per-account token files
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for `email`.
    ///
    /// ASCII letters, digits, `.` and `-` are kept, `@` becomes `_at_`, and
    /// every other byte is written as `_` plus two hex digits. `_` never
    /// appears unescaped, so distinct emails always get distinct files.
    pub fn storage_key(email: &str) -> String {
        let mut key = String::with_capacity(email.len() + 8);
        for byte in email.bytes() {
            match byte {
                b'@' => key.push_str("_at_"),
                b if b.is_ascii_alphanumeric() || b == b'.' || b == b'-' => key.push(b as char),
                b => key.push_str(&format!("_{:02x}", b)),
            }
        }
        key.push_str(".json");
        key
    }

    pub fn path_for(&self, email: &str) -> PathBuf {
        self.dir.join(Self::storage_key(email))
    }

    /// Write `account` to its token file.
    ///
    /// The record goes to a temporary file first and is renamed into place,
    /// so a crash never leaves a truncated token file behind.
    pub fn save(&self, account: &Account) -> Result<()> {
        ensure_dir(&self.dir)?;

        let path = if account.token_file.as_os_str().is_empty() {
            self.path_for(&account.email)
        } else {
            account.token_file.clone()
        };
        let tmp = path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(account)?;
        {
            let mut file = open_private(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Read every `*.json` record in the directory.
    ///
    /// Files that cannot be read or parsed are skipped with a warning. Each
    /// returned account has `token_file` set to the file it came from.
    pub fn load_all(&self) -> Result<Vec<Account>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut accounts = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<Account>(&content).map_err(|e| e.to_string())
                });

            match parsed {
                Ok(mut account) => {
                    account.token_file = path;
                    accounts.push(account);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable token file {}: {}", path.display(), e);
                }
            }
        }

        Ok(accounts)
    }

    /// Delete a token file; a file that is already gone is not an error
    pub fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the legacy single-account token file, if present
    pub fn read_legacy(path: &Path) -> Result<Option<Credential>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
