//! Thin Google API collaborators
//!
//! Each service client wraps an [`ApiTransport`] that attaches the bearer
//! token of one account, applies the request timeout, and turns non-success
//! responses into [`ApiError::UpstreamCallFailed`] rewritten for the account.

pub mod calendar;
pub mod docs;
pub mod drive;
pub mod gmail;
pub mod sheets;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::remediation::remediate;
use crate::auth::token_source::TokenSource;
use crate::error::{ApiError, Result, WorkspaceMcpError};

/// Google Workspace services exposed as tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Drive,
    Gmail,
    Sheets,
    Docs,
    Calendar,
}

impl Service {
    /// Lowercase identifier, also the tool name prefix
    pub fn name(self) -> &'static str {
        match self {
            Service::Drive => "drive",
            Service::Gmail => "gmail",
            Service::Sheets => "sheets",
            Service::Docs => "docs",
            Service::Calendar => "calendar",
        }
    }

    /// Display name
    pub fn title(self) -> &'static str {
        match self {
            Service::Drive => "Drive",
            Service::Gmail => "Gmail",
            Service::Sheets => "Sheets",
            Service::Docs => "Docs",
            Service::Calendar => "Calendar",
        }
    }

    /// Cloud console page where the API can be enabled
    pub fn api_enable_url(self) -> &'static str {
        match self {
            Service::Drive => "https://console.cloud.google.com/apis/library/drive.googleapis.com",
            Service::Gmail => "https://console.cloud.google.com/apis/library/gmail.googleapis.com",
            Service::Sheets => "https://console.cloud.google.com/apis/library/sheets.googleapis.com",
            Service::Docs => "https://console.cloud.google.com/apis/library/docs.googleapis.com",
            Service::Calendar => {
                "https://console.cloud.google.com/apis/library/calendar-json.googleapis.com"
            }
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared HTTP settings handed to every client a pool builds
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub http_client: reqwest::Client,
    pub timeout: Duration,
}

impl ClientSettings {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Transport for `service` rooted at `base_url`, authenticated by `tokens`
    pub fn transport(
        &self,
        service: Service,
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> ApiTransport {
        ApiTransport::new(
            service,
            base_url,
            self.http_client.clone(),
            self.timeout,
            tokens,
        )
    }
}

/// Authenticated HTTP access to one Google API on behalf of one account
#[derive(Clone)]
pub struct ApiTransport {
    service: Service,
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
    tokens: Arc<dyn TokenSource>,
}

impl ApiTransport {
    pub fn new(
        service: Service,
        base_url: impl Into<String>,
        http_client: reqwest::Client,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            service,
            base_url: base_url.into(),
            http_client,
            timeout,
            tokens,
        }
    }

    /// Account label this transport acts for
    pub fn account(&self) -> &str {
        self.tokens.account()
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.http_client.get(self.url(path)).query(query);
        self.send(request).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.http_client.post(self.url(path)).json(body);
        self.send(request).await
    }

    pub async fn put<T, Q, B>(&self, path: &str, query: &Q, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        let request = self.http_client.put(self.url(path)).query(query).json(body);
        self.send(request).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.http_client.patch(self.url(path)).json(body);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        match self.try_send(request).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let granted = self.tokens.granted_scopes().await;
                Err(remediate(err, self.service, self.account(), &granted))
            }
        }
    }

    async fn try_send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = self.tokens.access_token().await?;

        let response = request
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
                service: self.service.name().to_string(),
                status: status.as_u16(),
                message: text,
            }));
        }

        response.json().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> WorkspaceMcpError {
        if err.is_timeout() {
            return WorkspaceMcpError::Api(ApiError::Timeout {
                service: self.service.name().to_string(),
                secs: self.timeout.as_secs(),
            });
        }
        WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
            service: self.service.name().to_string(),
            status: err.status().map_or(0, |s| s.as_u16()),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names() {
        assert_eq!(Service::Drive.name(), "drive");
        assert_eq!(Service::Sheets.title(), "Sheets");
        assert!(Service::Docs.api_enable_url().ends_with("docs.googleapis.com"));
        assert!(Service::Calendar.api_enable_url().ends_with("calendar-json.googleapis.com"));
        assert_eq!(Service::Gmail.to_string(), "gmail");
    }
}
