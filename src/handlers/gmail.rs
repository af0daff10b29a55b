//! Gmail tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::{McpError, Result, WorkspaceMcpError};
use crate::google::gmail::{GmailClient, MessageSummary};
use crate::handlers::fan_out_json;
use crate::mcp::tools::{
    object_schema, parse_args, resource_def, tool_def, unknown_tool, with_account, ServiceHandler,
};
use crate::mcp::types::{Resource, Tool};

const INBOX_URI: &str = "gmail://inbox";
const INBOX_QUERY: &str = "in:inbox";
const DEFAULT_MAX_RESULTS: u32 = 10;
const INBOX_PAGE_SIZE: u32 = 20;

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    account: Option<String>,
    #[serde(default)]
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    account: Option<String>,
    message_id: String,
}

pub struct GmailHandler {
    dispatcher: Dispatcher<GmailClient>,
}

impl GmailHandler {
    pub fn new(dispatcher: Dispatcher<GmailClient>) -> Self {
        Self { dispatcher }
    }

    async fn list(&self, args: Value) -> Result<Value> {
        let args: ListArgs = parse_args(args)?;
        let query = args.query;
        let max_results = args.max_results;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let messages = client.list_summaries(&query, max_results).await?;
                Ok(json!({
                    "count": messages.len(),
                    "messages": messages,
                }))
            })
            .await
    }

    async fn get(&self, args: Value) -> Result<Value> {
        let args: GetArgs = parse_args(args)?;
        let message_id = args.message_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let message = client.get_message(&message_id).await?;
                Ok(json!({ "message": message }))
            })
            .await
    }

    async fn list_all(&self, args: Value) -> Result<Value> {
        let args: ListArgs = parse_args(args)?;
        let query = if args.query.trim().is_empty() {
            INBOX_QUERY.to_string()
        } else {
            args.query
        };
        self.summaries_everywhere(query, args.max_results).await
    }

    async fn summaries_everywhere(&self, query: String, max_results: u32) -> Result<Value> {
        let outcome = self
            .dispatcher
            .fan_out(|client: Arc<GmailClient>| {
                let query = query.clone();
                async move { client.list_summaries(&query, max_results).await }
            })
            .await?;
        fan_out_json(outcome, |messages: &Vec<MessageSummary>| messages.len())
    }
}

#[async_trait]
impl ServiceHandler for GmailHandler {
    fn tools(&self) -> Vec<Tool> {
        let query = json!({
            "type": "string",
            "description": "Gmail search query, e.g. \"from:alice is:unread\""
        });
        let max_results = json!({
            "type": "integer",
            "description": "Maximum number of messages per account (default 10)"
        });

        vec![
            tool_def(
                "gmail_messages_list",
                "List or search messages in one account",
                with_account(object_schema(
                    json!({ "query": query, "max_results": max_results }),
                    &[],
                )),
            ),
            tool_def(
                "gmail_message_get",
                "Read a message: headers, labels and plain-text body",
                with_account(object_schema(
                    json!({ "message_id": { "type": "string" } }),
                    &["message_id"],
                )),
            ),
            tool_def(
                "gmail_messages_list_all_accounts",
                "Search messages in every account at once (defaults to the inbox)",
                object_schema(json!({ "query": query, "max_results": max_results }), &[]),
            ),
        ]
    }

    fn resources(&self) -> Vec<Resource> {
        vec![resource_def(
            INBOX_URI,
            "Inbox",
            "Latest inbox messages of every account",
        )]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "gmail_messages_list" => self.list(arguments).await,
            "gmail_message_get" => self.get(arguments).await,
            "gmail_messages_list_all_accounts" => self.list_all(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        match uri {
            INBOX_URI => {
                self.summaries_everywhere(INBOX_QUERY.to_string(), INBOX_PAGE_SIZE)
                    .await
            }
            _ => Err(WorkspaceMcpError::Mcp(McpError::UnknownResource {
                uri: uri.to_string(),
            })),
        }
    }
}
