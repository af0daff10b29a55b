//! Required OAuth scopes per service

use crate::google::Service;

/// Scopes each service needs; an account must hold at least one of them
pub fn required_scopes(service: Service) -> &'static [&'static str] {
    match service {
        Service::Drive => &[
            "https://www.googleapis.com/auth/drive",
            "https://www.googleapis.com/auth/drive.file",
        ],
        Service::Gmail => &[
            "https://www.googleapis.com/auth/gmail.modify",
            "https://www.googleapis.com/auth/gmail.readonly",
        ],
        Service::Sheets => &["https://www.googleapis.com/auth/spreadsheets"],
        Service::Docs => &["https://www.googleapis.com/auth/documents"],
        Service::Calendar => &[
            "https://www.googleapis.com/auth/calendar",
            "https://www.googleapis.com/auth/calendar.events",
        ],
    }
}

/// Required scopes for `service` that `granted` lacks.
///
/// Returns an empty list when any one of the service's scopes is granted,
/// or when nothing is known about the granted scopes.
pub fn missing_scopes(service: Service, granted: &[String]) -> Vec<String> {
    if granted.is_empty() {
        return Vec::new();
    }

    let required = required_scopes(service);
    if required.iter().any(|r| granted.iter().any(|g| g == r)) {
        return Vec::new();
    }

    required.iter().map(|s| s.to_string()).collect()
}

/// Union of `current` and `additional`, order preserved, duplicates removed
pub fn merge_scopes(current: &[String], additional: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(current.len() + additional.len());
    for scope in current.iter().chain(additional) {
        if !merged.contains(scope) {
            merged.push(scope.clone());
        }
    }
    merged
}
