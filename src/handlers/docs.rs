//! Docs tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::{Result, WorkspaceMcpError};
use crate::google::docs::DocsClient;
use crate::mcp::tools::{object_schema, parse_args, tool_def, unknown_tool, with_account, ServiceHandler};
use crate::mcp::types::Tool;

#[derive(Debug, Deserialize)]
struct GetArgs {
    account: Option<String>,
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    account: Option<String>,
    title: String,
    content: Option<String>,
}

pub struct DocsHandler {
    dispatcher: Dispatcher<DocsClient>,
}

impl DocsHandler {
    pub fn new(dispatcher: Dispatcher<DocsClient>) -> Self {
        Self { dispatcher }
    }

    async fn get(&self, args: Value) -> Result<Value> {
        let args: GetArgs = parse_args(args)?;
        let id = args.document_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let document = client.get_document(&id).await?;
                Ok(json!({
                    "document_id": document.document_id,
                    "title": document.title,
                    "text": document.plain_text(),
                    "revision_id": document.revision_id,
                }))
            })
            .await
    }

    async fn create(&self, args: Value) -> Result<Value> {
        let args: CreateArgs = parse_args(args)?;
        if args.title.trim().is_empty() {
            return Err(WorkspaceMcpError::invalid_arguments("title must not be empty"));
        }
        let title = args.title;
        let content = args.content;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let document = client.create_document(&title, content.as_deref()).await?;
                Ok(json!({
                    "document_id": document.document_id,
                    "title": document.title,
                    "url": format!("https://docs.google.com/document/d/{}/edit", document.document_id),
                }))
            })
            .await
    }
}

#[async_trait]
impl ServiceHandler for DocsHandler {
    fn tools(&self) -> Vec<Tool> {
        vec![
            tool_def(
                "docs_document_get",
                "Read a document's title and plain text",
                with_account(object_schema(
                    json!({ "document_id": { "type": "string" } }),
                    &["document_id"],
                )),
            ),
            tool_def(
                "docs_document_create",
                "Create a document, optionally with initial text",
                with_account(object_schema(
                    json!({
                        "title": { "type": "string" },
                        "content": { "type": "string", "description": "Initial body text" }
                    }),
                    &["title"],
                )),
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "docs_document_get" => self.get(arguments).await,
            "docs_document_create" => self.create(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }
}
