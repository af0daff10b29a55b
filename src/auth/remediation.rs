//! Rewrites raw upstream failures into actionable messages
//!
//! Google reports scope, permission and "API not enabled" problems as
//! ordinary HTTP errors. These are recognized from the response text and
//! turned into instructions naming the affected account.

use crate::auth::scopes::missing_scopes;
use crate::error::{ApiError, WorkspaceMcpError};
use crate::google::Service;

/// Rewrite `err` for a call made as `account` against `service`.
///
/// `granted` is the account's stored scope list; when it shows a required
/// scope is missing, a permission failure is reported as a scope problem.
/// Errors that are not upstream failures pass through untouched.
pub fn remediate(
    err: WorkspaceMcpError,
    service: Service,
    account: &str,
    granted: &[String],
) -> WorkspaceMcpError {
    let Some((status, message)) = upstream_failure(&err) else {
        return err;
    };

    if is_api_disabled(&message) {
        return WorkspaceMcpError::Api(ApiError::ApiDisabled {
            service: service.title().to_string(),
            account: account.to_string(),
            enable_url: service.api_enable_url().to_string(),
        });
    }

    if is_insufficient_permissions(status, &message) {
        let missing = missing_scopes(service, granted);
        if !missing.is_empty() {
            return WorkspaceMcpError::Api(ApiError::MissingScopes {
                service: service.name().to_string(),
                account: account.to_string(),
                missing,
            });
        }
        return WorkspaceMcpError::Api(ApiError::InsufficientPermissions {
            service: service.title().to_string(),
            account: account.to_string(),
        });
    }

    err
}

fn upstream_failure(err: &WorkspaceMcpError) -> Option<(u16, String)> {
    match err {
        WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
            status, message, ..
        }) => Some((*status, message.clone())),
        _ => None,
    }
}

fn is_api_disabled(message: &str) -> bool {
    message.contains("SERVICE_DISABLED")
        || message.contains("has not been used in project")
        || message.contains("accessNotConfigured")
}

fn is_insufficient_permissions(status: u16, message: &str) -> bool {
    (status == 403 || message.contains("403"))
        && (message.contains("insufficientPermissions")
            || message.contains("Insufficient Permission")
            || message.contains("PERMISSION_DENIED")
            || message.contains("ACCESS_TOKEN_SCOPE_INSUFFICIENT"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountError;

    fn upstream(status: u16, message: &str) -> WorkspaceMcpError {
        WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
            service: "drive".to_string(),
            status,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_api_disabled() {
        let err = remediate(
            upstream(403, "Drive API has not been used in project 123"),
            Service::Drive,
            "me@example.com",
            &[],
        );
        let text = err.to_string();
        assert!(text.contains("drive.googleapis.com"));
        assert!(text.contains("me@example.com"));
    }

    #[test]
    fn test_permission_denied_with_missing_scope() {
        let granted = vec!["https://www.googleapis.com/auth/drive".to_string()];
        let err = remediate(
            upstream(403, "PERMISSION_DENIED"),
            Service::Sheets,
            "me@example.com",
            &granted,
        );
        assert!(matches!(
            err,
            WorkspaceMcpError::Api(ApiError::MissingScopes { ref missing, .. }) if missing.len() == 1
        ));
    }

    #[test]
    fn test_permission_denied_without_scope_info() {
        let err = remediate(
            upstream(403, "Request had insufficientPermissions"),
            Service::Gmail,
            "me@example.com",
            &[],
        );
        assert!(matches!(
            err,
            WorkspaceMcpError::Api(ApiError::InsufficientPermissions { .. })
        ));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = remediate(upstream(404, "File not found"), Service::Drive, "a@x.com", &[]);
        assert!(matches!(
            err,
            WorkspaceMcpError::Api(ApiError::UpstreamCallFailed { status: 404, .. })
        ));

        let err = remediate(
            AccountError::NoAccounts.into(),
            Service::Drive,
            "a@x.com",
            &[],
        );
        assert!(matches!(err, WorkspaceMcpError::Account(AccountError::NoAccounts)));
    }
}
