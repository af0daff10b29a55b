//! Drive tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::{McpError, Result, WorkspaceMcpError};
use crate::google::drive::{DriveClient, FileList, ListFilesRequest};
use crate::handlers::fan_out_json;
use crate::mcp::tools::{
    object_schema, parse_args, resource_def, tool_def, unknown_tool, with_account, ServiceHandler,
};
use crate::mcp::types::{Resource, Tool};

const RECENT_URI: &str = "drive://recent";
const STARRED_URI: &str = "drive://starred";
const RESOURCE_PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct ListArgs {
    account: Option<String>,
    query: Option<String>,
    page_size: Option<u32>,
    order_by: Option<String>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    account: Option<String>,
    query: String,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    account: Option<String>,
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateFolderArgs {
    account: Option<String>,
    name: String,
    parent_id: Option<String>,
}

pub struct DriveHandler {
    dispatcher: Dispatcher<DriveClient>,
}

impl DriveHandler {
    pub fn new(dispatcher: Dispatcher<DriveClient>) -> Self {
        Self { dispatcher }
    }

    async fn list(&self, args: Value) -> Result<Value> {
        let args: ListArgs = parse_args(args)?;
        let request = ListFilesRequest {
            query: args.query,
            page_size: args.page_size,
            order_by: args.order_by,
            page_token: args.page_token,
        };

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let list = client.list_files(&request).await?;
                file_list_json(list)
            })
            .await
    }

    async fn search(&self, args: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(args)?;
        let query = args.query;
        let page_size = args.page_size;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let list = client.search_files(&query, page_size).await?;
                file_list_json(list)
            })
            .await
    }

    async fn get_metadata(&self, args: Value) -> Result<Value> {
        let args: FileArgs = parse_args(args)?;
        let file_id = args.file_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let file = client.get_file(&file_id).await?;
                Ok(json!({ "file": file }))
            })
            .await
    }

    async fn create_folder(&self, args: Value) -> Result<Value> {
        let args: CreateFolderArgs = parse_args(args)?;
        if args.name.trim().is_empty() {
            return Err(WorkspaceMcpError::invalid_arguments("folder name must not be empty"));
        }
        let name = args.name;
        let parent_id = args.parent_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let folder = client.create_folder(&name, parent_id.as_deref()).await?;
                Ok(json!({ "folder": folder }))
            })
            .await
    }

    async fn trash(&self, args: Value) -> Result<Value> {
        let args: FileArgs = parse_args(args)?;
        let file_id = args.file_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let file = client.trash_file(&file_id).await?;
                Ok(json!({ "trashed": true, "file": file }))
            })
            .await
    }

    async fn list_all(&self, args: Value) -> Result<Value> {
        let args: ListArgs = parse_args(args)?;
        let request = ListFilesRequest {
            query: args.query,
            page_size: args.page_size,
            order_by: args.order_by,
            page_token: None,
        };

        let outcome = self
            .dispatcher
            .fan_out(|client| {
                let request = request.clone();
                async move { client.list_files(&request).await }
            })
            .await?;
        fan_out_json(outcome, |list: &FileList| list.files.len())
    }

    async fn search_all(&self, args: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(args)?;
        let query = args.query;
        let page_size = args.page_size;

        let outcome = self
            .dispatcher
            .fan_out(|client| {
                let query = query.clone();
                async move { client.search_files(&query, page_size).await }
            })
            .await?;
        fan_out_json(outcome, |list: &FileList| list.files.len())
    }
}

fn file_list_json(list: FileList) -> Result<Value> {
    let count = list.files.len();
    let mut value = serde_json::to_value(list)?;
    value["count"] = json!(count);
    Ok(value)
}

#[async_trait]
impl ServiceHandler for DriveHandler {
    fn tools(&self) -> Vec<Tool> {
        let page_size = json!({ "type": "integer", "description": "Maximum number of files (default 20)" });

        vec![
            tool_def(
                "drive_files_list",
                "List Drive files, optionally filtered with a Drive query",
                with_account(object_schema(
                    json!({
                        "query": { "type": "string", "description": "Drive query, e.g. \"'root' in parents\"" },
                        "page_size": page_size,
                        "order_by": { "type": "string", "description": "Sort order, e.g. \"modifiedTime desc\"" },
                        "page_token": { "type": "string" }
                    }),
                    &[],
                )),
            ),
            tool_def(
                "drive_files_search",
                "Search Drive files by name and content",
                with_account(object_schema(
                    json!({
                        "query": { "type": "string", "description": "Text to search for" },
                        "page_size": page_size
                    }),
                    &["query"],
                )),
            ),
            tool_def(
                "drive_file_get_metadata",
                "Get the metadata of a Drive file",
                with_account(object_schema(
                    json!({ "file_id": { "type": "string" } }),
                    &["file_id"],
                )),
            ),
            tool_def(
                "drive_folder_create",
                "Create a Drive folder",
                with_account(object_schema(
                    json!({
                        "name": { "type": "string" },
                        "parent_id": { "type": "string", "description": "Parent folder ID; defaults to My Drive" }
                    }),
                    &["name"],
                )),
            ),
            tool_def(
                "drive_file_trash",
                "Move a Drive file to the trash",
                with_account(object_schema(
                    json!({ "file_id": { "type": "string" } }),
                    &["file_id"],
                )),
            ),
            tool_def(
                "drive_files_list_all_accounts",
                "List Drive files across every account",
                object_schema(
                    json!({
                        "query": { "type": "string" },
                        "page_size": page_size,
                        "order_by": { "type": "string" }
                    }),
                    &[],
                ),
            ),
            tool_def(
                "drive_files_search_all_accounts",
                "Search Drive files across every account",
                object_schema(
                    json!({
                        "query": { "type": "string" },
                        "page_size": page_size
                    }),
                    &["query"],
                ),
            ),
        ]
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            resource_def(RECENT_URI, "Recent Drive files", "Recently modified files in every account"),
            resource_def(STARRED_URI, "Starred Drive files", "Starred files in every account"),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "drive_files_list" => self.list(arguments).await,
            "drive_files_search" => self.search(arguments).await,
            "drive_file_get_metadata" => self.get_metadata(arguments).await,
            "drive_folder_create" => self.create_folder(arguments).await,
            "drive_file_trash" => self.trash(arguments).await,
            "drive_files_list_all_accounts" => self.list_all(arguments).await,
            "drive_files_search_all_accounts" => self.search_all(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        let starred = match uri {
            RECENT_URI => false,
            STARRED_URI => true,
            _ => {
                return Err(WorkspaceMcpError::Mcp(McpError::UnknownResource {
                    uri: uri.to_string(),
                }))
            }
        };

        let outcome = self
            .dispatcher
            .fan_out(move |client: Arc<DriveClient>| async move {
                if starred {
                    client.starred_files(RESOURCE_PAGE_SIZE).await
                } else {
                    client.recent_files(RESOURCE_PAGE_SIZE).await
                }
            })
            .await?;
        fan_out_json(outcome, |list: &FileList| list.files.len())
    }
}
