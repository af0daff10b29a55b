//! Sheets tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::{Result, WorkspaceMcpError};
use crate::google::sheets::SheetsClient;
use crate::mcp::tools::{object_schema, parse_args, tool_def, unknown_tool, with_account, ServiceHandler};
use crate::mcp::types::Tool;

#[derive(Debug, Deserialize)]
struct SpreadsheetArgs {
    account: Option<String>,
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct GetValuesArgs {
    account: Option<String>,
    spreadsheet_id: String,
    range: String,
}

#[derive(Debug, Deserialize)]
struct UpdateValuesArgs {
    account: Option<String>,
    spreadsheet_id: String,
    range: String,
    values: Vec<Vec<Value>>,
}

pub struct SheetsHandler {
    dispatcher: Dispatcher<SheetsClient>,
}

impl SheetsHandler {
    pub fn new(dispatcher: Dispatcher<SheetsClient>) -> Self {
        Self { dispatcher }
    }

    async fn get_spreadsheet(&self, args: Value) -> Result<Value> {
        let args: SpreadsheetArgs = parse_args(args)?;
        let id = args.spreadsheet_id;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let spreadsheet = client.get_spreadsheet(&id).await?;
                Ok(json!({ "spreadsheet": spreadsheet }))
            })
            .await
    }

    async fn get_values(&self, args: Value) -> Result<Value> {
        let args: GetValuesArgs = parse_args(args)?;
        let id = args.spreadsheet_id;
        let range = args.range;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let values = client.get_values(&id, &range).await?;
                Ok(json!({
                    "range": values.range,
                    "row_count": values.values.len(),
                    "values": values.values,
                }))
            })
            .await
    }

    async fn update_values(&self, args: Value) -> Result<Value> {
        let args: UpdateValuesArgs = parse_args(args)?;
        if args.values.is_empty() {
            return Err(WorkspaceMcpError::invalid_arguments("values must contain at least one row"));
        }
        let id = args.spreadsheet_id;
        let range = args.range;
        let values = args.values;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let response = client.update_values(&id, &range, values).await?;
                Ok(json!({ "updated": response }))
            })
            .await
    }
}

#[async_trait]
impl ServiceHandler for SheetsHandler {
    fn tools(&self) -> Vec<Tool> {
        let spreadsheet_id = json!({ "type": "string", "description": "Spreadsheet ID from its URL" });
        let range = json!({ "type": "string", "description": "A1 range, e.g. \"Sheet1!A1:C10\"" });

        vec![
            tool_def(
                "sheets_spreadsheet_get",
                "Get a spreadsheet's title and sheet list",
                with_account(object_schema(
                    json!({ "spreadsheet_id": spreadsheet_id }),
                    &["spreadsheet_id"],
                )),
            ),
            tool_def(
                "sheets_values_get",
                "Read cell values from a range",
                with_account(object_schema(
                    json!({ "spreadsheet_id": spreadsheet_id, "range": range }),
                    &["spreadsheet_id", "range"],
                )),
            ),
            tool_def(
                "sheets_values_update",
                "Write cell values to a range",
                with_account(object_schema(
                    json!({
                        "spreadsheet_id": spreadsheet_id,
                        "range": range,
                        "values": {
                            "type": "array",
                            "description": "Rows of cell values",
                            "items": { "type": "array" }
                        }
                    }),
                    &["spreadsheet_id", "range", "values"],
                )),
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "sheets_spreadsheet_get" => self.get_spreadsheet(arguments).await,
            "sheets_values_get" => self.get_values(arguments).await,
            "sheets_values_update" => self.update_values(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }
}
