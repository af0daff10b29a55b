//! Picks an account for a free-text hint
//!
//! Precedence, first match wins:
//! 1. the hint contains `@` and contains a registered email
//! 2. the hint contains `.` and contains a registered email's domain
//! 3. exactly one account is registered
//! 4. no accounts: [`AccountError::NoAccounts`]
//! 5. otherwise [`AccountError::AmbiguousAccount`] listing every email
//!
//! When several accounts match in steps 1 or 2 the longest match wins; see
//! [`resolve`] for the remaining tie-breaks.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::accounts::types::Account;
use crate::error::AccountError;

/// Resolve `hint` against `accounts` (keyed by email).
///
/// Matching is ASCII case-insensitive. Email candidates are ordered by email
/// length, then email. Domain candidates are ordered by domain length, then
/// most recent use, then email.
pub fn resolve<'a>(
    accounts: &'a BTreeMap<String, Account>,
    hint: &str,
) -> Result<&'a Account, AccountError> {
    let hint = hint.trim().to_ascii_lowercase();

    if hint.contains('@') {
        if let Some(account) = match_by_email(accounts, &hint) {
            return Ok(account);
        }
    }

    if hint.contains('.') {
        if let Some(account) = match_by_domain(accounts, &hint) {
            return Ok(account);
        }
    }

    let mut all = accounts.values();
    match (all.next(), all.next()) {
        (Some(only), None) => Ok(only),
        (None, _) => Err(AccountError::NoAccounts),
        _ => Err(AccountError::AmbiguousAccount {
            candidates: accounts.keys().cloned().collect(),
        }),
    }
}

fn match_by_email<'a>(accounts: &'a BTreeMap<String, Account>, hint: &str) -> Option<&'a Account> {
    accounts
        .values()
        .filter(|a| !a.email.is_empty() && hint.contains(&a.email.to_ascii_lowercase()))
        .min_by(|a, b| {
            b.email
                .len()
                .cmp(&a.email.len())
                .then_with(|| a.email.cmp(&b.email))
        })
}

fn match_by_domain<'a>(accounts: &'a BTreeMap<String, Account>, hint: &str) -> Option<&'a Account> {
    accounts
        .values()
        .filter_map(|a| {
            let domain = a.domain()?.to_ascii_lowercase();
            (!domain.is_empty() && hint.contains(&domain)).then_some((domain.len(), a))
        })
        .min_by(|(len_a, a), (len_b, b)| by_domain_rank(*len_a, a, *len_b, b))
        .map(|(_, account)| account)
}

fn by_domain_rank(len_a: usize, a: &Account, len_b: usize, b: &Account) -> Ordering {
    len_b
        .cmp(&len_a)
        .then_with(|| b.last_used.cmp(&a.last_used))
        .then_with(|| a.email.cmp(&b.email))
}
