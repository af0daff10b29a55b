//! Google Docs v1 client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::token_source::TokenSource;
use crate::config::google::DOCS_API;
use crate::dispatch::pool::ServiceClient;
use crate::error::Result;
use crate::google::{ApiTransport, ClientSettings, Service};

/// The parts of a document this server reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing)]
    pub body: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

impl Document {
    /// Concatenated text runs of the document body
    pub fn plain_text(&self) -> String {
        let mut text = String::new();
        let Some(content) = self
            .body
            .as_ref()
            .and_then(|b| b.get("content"))
            .and_then(Value::as_array)
        else {
            return text;
        };

        for element in content {
            let Some(runs) = element
                .pointer("/paragraph/elements")
                .and_then(Value::as_array)
            else {
                continue;
            };
            for run in runs {
                if let Some(s) = run.pointer("/textRun/content").and_then(Value::as_str) {
                    text.push_str(s);
                }
            }
        }
        text
    }
}

/// Docs client for one account
#[derive(Clone)]
pub struct DocsClient {
    transport: ApiTransport,
}

impl ServiceClient for DocsClient {
    const SERVICE: Service = Service::Docs;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            transport: settings.transport(Service::Docs, DOCS_API, tokens),
        })
    }
}

impl DocsClient {
    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        self.transport
            .get(&urlencoding::encode(document_id), &[("fields", "documentId,title,body,revisionId")])
            .await
    }

    /// Create a document, optionally seeded with `content`
    pub async fn create_document(&self, title: &str, content: Option<&str>) -> Result<Document> {
        let document: Document = self.transport.post("", &json!({ "title": title })).await?;

        if let Some(text) = content.filter(|t| !t.is_empty()) {
            let requests = json!({
                "requests": [{
                    "insertText": {
                        "location": { "index": 1 },
                        "text": text,
                    }
                }]
            });
            let _: Value = self
                .transport
                .post(
                    &format!("{}:batchUpdate", urlencoding::encode(&document.document_id)),
                    &requests,
                )
                .await?;
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_joins_runs() {
        let doc: Document = serde_json::from_value(json!({
            "documentId": "d1",
            "title": "Notes",
            "body": {
                "content": [
                    {"sectionBreak": {}},
                    {"paragraph": {"elements": [
                        {"textRun": {"content": "Hello "}},
                        {"textRun": {"content": "world\n"}}
                    ]}}
                ]
            }
        }))
        .unwrap();
        assert_eq!(doc.plain_text(), "Hello world\n");
    }

    #[test]
    fn test_plain_text_of_empty_document() {
        let doc: Document =
            serde_json::from_value(json!({"documentId": "d2", "title": "Empty"})).unwrap();
        assert_eq!(doc.plain_text(), "");
    }
}
