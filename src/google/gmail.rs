//! Gmail v1 client

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::auth::token_source::TokenSource;
use crate::config::google::GMAIL_API;
use crate::dispatch::pool::ServiceClient;
use crate::error::{ApiError, Result, WorkspaceMcpError};
use crate::google::{ApiTransport, ClientSettings, Service};

/// Metadata requests one summaries call keeps in flight
pub const SUMMARY_CONCURRENCY: usize = 8;

/// A MIME part of a message
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub headers: Vec<Header>,

    #[serde(default)]
    pub body: Option<MessagePartBody>,

    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePartBody {
    #[serde(default)]
    pub size: i64,

    /// Base64url-encoded content
    #[serde(default)]
    pub data: Option<String>,
}

/// A message as returned by `messages.get`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,

    #[serde(default)]
    pub thread_id: String,

    #[serde(default)]
    pub label_ids: Vec<String>,

    #[serde(default)]
    pub snippet: String,

    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// A page of message references
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub result_size_estimate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,

    #[serde(default)]
    pub thread_id: String,
}

/// Headline fields of a message, used in listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
}

/// A message with its headers and plain-text body extracted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub labels: Vec<String>,
    pub snippet: String,
    pub body: String,
}

impl MessageSummary {
    fn from_message(message: &Message) -> Self {
        let header = |name: &str| header_value(message.payload.as_ref(), name);
        Self {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            subject: header("Subject"),
            from: header("From"),
            date: header("Date"),
            snippet: message.snippet.clone(),
        }
    }
}

impl MessageDetail {
    fn from_message(message: Message) -> Self {
        let payload = message.payload.as_ref();
        let body = payload
            .and_then(plain_text_body)
            .unwrap_or_else(|| message.snippet.clone());

        Self {
            subject: header_value(payload, "Subject"),
            from: header_value(payload, "From"),
            to: header_value(payload, "To"),
            date: header_value(payload, "Date"),
            id: message.id,
            thread_id: message.thread_id,
            labels: message.label_ids,
            snippet: message.snippet,
            body,
        }
    }
}

/// Gmail client for one account
#[derive(Clone)]
pub struct GmailClient {
    transport: ApiTransport,
}

impl ServiceClient for GmailClient {
    const SERVICE: Service = Service::Gmail;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            transport: settings.transport(Service::Gmail, GMAIL_API, tokens),
        })
    }
}

impl GmailClient {
    /// Message references matching a Gmail search query
    pub async fn list_messages(&self, query: &str, max_results: u32) -> Result<MessageList> {
        let max_results = max_results.clamp(1, 500).to_string();
        let mut params = vec![("maxResults", max_results.as_str())];
        if !query.is_empty() {
            params.push(("q", query));
        }
        self.transport.get("messages", &params).await
    }

    /// Search and fetch the headline fields of each hit.
    ///
    /// Metadata requests run concurrently, at most [`SUMMARY_CONCURRENCY`]
    /// at a time, so the whole call costs about two round trips. Summaries
    /// keep the order of the search results.
    pub async fn list_summaries(&self, query: &str, max_results: u32) -> Result<Vec<MessageSummary>> {
        let list = self.list_messages(query, max_results).await?;

        let permits = Arc::new(Semaphore::new(SUMMARY_CONCURRENCY));
        let mut tasks = JoinSet::new();
        for (index, message_ref) in list.messages.into_iter().enumerate() {
            let transport = self.transport.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let message: Message = transport
                    .get(
                        &format!("messages/{}", urlencoding::encode(&message_ref.id)),
                        &[
                            ("format", "metadata"),
                            ("metadataHeaders", "Subject"),
                            ("metadataHeaders", "From"),
                            ("metadataHeaders", "Date"),
                        ],
                    )
                    .await?;
                Ok::<_, WorkspaceMcpError>((index, MessageSummary::from_message(&message)))
            });
        }

        let mut summaries = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let fetched = joined.map_err(|e| {
                WorkspaceMcpError::Api(ApiError::UpstreamCallFailed {
                    service: Service::Gmail.name().to_string(),
                    status: 0,
                    message: format!("message fetch task failed: {}", e),
                })
            })?;
            summaries.push(fetched?);
        }

        summaries.sort_by_key(|(index, _)| *index);
        Ok(summaries.into_iter().map(|(_, summary)| summary).collect())
    }

    /// Fetch a full message and extract its headers and text body
    pub async fn get_message(&self, message_id: &str) -> Result<MessageDetail> {
        let message: Message = self
            .transport
            .get(
                &format!("messages/{}", urlencoding::encode(message_id)),
                &[("format", "full")],
            )
            .await?;
        Ok(MessageDetail::from_message(message))
    }
}

/// Case-insensitive header lookup on the top-level part
fn header_value(payload: Option<&MessagePart>, name: &str) -> String {
    payload
        .and_then(|p| p.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

/// First `text/plain` body found depth-first, decoded
fn plain_text_body(part: &MessagePart) -> Option<String> {
    if part.mime_type.starts_with("text/plain") {
        if let Some(text) = part
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_base64url)
        {
            return Some(text);
        }
    }
    part.parts.iter().find_map(plain_text_body)
}

/// Gmail uses unpadded base64url, but padded input shows up too
pub fn decode_base64url(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json() -> &'static str {
        r#"{
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX"],
            "snippet": "Hello there",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Greetings"},
                    {"name": "from", "value": "alice@example.com"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"size": 5, "data": "PGI-aGk8L2I-"}},
                    {"mimeType": "text/plain", "body": {"size": 11, "data": "SGVsbG8gV29ybGQ"}}
                ]
            }
        }"#
    }

    #[test]
    fn test_detail_extracts_plain_body() {
        let message: Message = serde_json::from_str(message_json()).unwrap();
        let detail = MessageDetail::from_message(message);
        assert_eq!(detail.subject, "Greetings");
        assert_eq!(detail.from, "alice@example.com");
        assert_eq!(detail.body, "Hello World");
        assert_eq!(detail.labels, vec!["INBOX"]);
    }

    #[test]
    fn test_detail_falls_back_to_snippet() {
        let message: Message =
            serde_json::from_str(r#"{"id": "m2", "snippet": "just a snippet"}"#).unwrap();
        let detail = MessageDetail::from_message(message);
        assert_eq!(detail.body, "just a snippet");
        assert_eq!(detail.subject, "");
    }

    #[test]
    fn test_decode_base64url_accepts_padding() {
        assert_eq!(decode_base64url("SGVsbG8gV29ybGQ=").as_deref(), Some("Hello World"));
        assert_eq!(decode_base64url("SGVsbG8gV29ybGQ").as_deref(), Some("Hello World"));
        assert!(decode_base64url("!!!").is_none());
    }

    struct StaticTokens;

    #[async_trait::async_trait]
    impl TokenSource for StaticTokens {
        fn account(&self) -> &str {
            "a@x.com"
        }

        async fn access_token(&self) -> Result<String> {
            Ok("token".to_string())
        }

        async fn granted_scopes(&self) -> Vec<String> {
            Vec::new()
        }
    }

    /// Serve `count` messages whose metadata answers get slower towards the
    /// front of the list, so completion order is the reverse of list order
    async fn slow_gmail(count: usize) -> String {
        use axum::extract::Path;
        use axum::routing::get;
        use axum::{Json, Router};

        let app = Router::new()
            .route(
                "/messages",
                get(move || async move {
                    let messages: Vec<_> = (0..count)
                        .map(|i| serde_json::json!({ "id": format!("m{i}"), "threadId": "t" }))
                        .collect();
                    Json(serde_json::json!({ "messages": messages }))
                }),
            )
            .route(
                "/messages/:id",
                get(move |Path(id): Path<String>| async move {
                    let index: u64 = id.trim_start_matches('m').parse().unwrap();
                    let delay = 200 + 20 * (count as u64 - index);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    Json(serde_json::json!({
                        "id": id,
                        "threadId": "t",
                        "payload": { "headers": [{ "name": "Subject", "value": format!("subject {id}") }] }
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_summaries_fetch_concurrently_in_list_order() {
        let base = slow_gmail(SUMMARY_CONCURRENCY).await;
        let settings = ClientSettings::new(std::time::Duration::from_secs(5)).unwrap();
        let client = GmailClient {
            transport: settings.transport(Service::Gmail, &base, Arc::new(StaticTokens)),
        };

        let started = std::time::Instant::now();
        let summaries = client.list_summaries("in:inbox", 20).await.unwrap();
        let elapsed = started.elapsed();

        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4", "m5", "m6", "m7"]);
        assert_eq!(summaries[3].subject, "subject m3");
        // one at a time would take well over a second and a half
        assert!(elapsed < std::time::Duration::from_millis(1000), "took {elapsed:?}");
    }
}
