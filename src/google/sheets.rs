//! Google Sheets v4 client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::token_source::TokenSource;
use crate::config::google::SHEETS_API;
use crate::dispatch::pool::ServiceClient;
use crate::error::Result;
use crate::google::{ApiTransport, ClientSettings, Service};

/// Spreadsheet title and tabs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub spreadsheet_id: String,

    #[serde(default)]
    pub properties: SpreadsheetProperties,

    #[serde(default)]
    pub sheets: Vec<Sheet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Sheet {
    #[serde(default)]
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub index: i64,
}

/// Cell values of a range
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: String,

    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: String,

    #[serde(default)]
    pub updated_rows: u64,

    #[serde(default)]
    pub updated_columns: u64,

    #[serde(default)]
    pub updated_cells: u64,
}

/// Sheets client for one account
#[derive(Clone)]
pub struct SheetsClient {
    transport: ApiTransport,
}

impl ServiceClient for SheetsClient {
    const SERVICE: Service = Service::Sheets;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            transport: settings.transport(Service::Sheets, SHEETS_API, tokens),
        })
    }
}

impl SheetsClient {
    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Spreadsheet> {
        self.transport
            .get(
                &urlencoding::encode(spreadsheet_id),
                &[(
                    "fields",
                    "spreadsheetId,spreadsheetUrl,properties.title,sheets.properties",
                )],
            )
            .await
    }

    /// Read the values of an A1 range
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<ValueRange> {
        self.transport
            .get(
                &format!(
                    "{}/values/{}",
                    urlencoding::encode(spreadsheet_id),
                    urlencoding::encode(range)
                ),
                &[("valueRenderOption", "FORMATTED_VALUE")],
            )
            .await
    }

    /// Overwrite an A1 range; input is parsed as if typed by a user
    pub async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<Value>>,
    ) -> Result<UpdateValuesResponse> {
        let body = ValueRange {
            range: range.to_string(),
            values,
        };
        self.transport
            .put(
                &format!(
                    "{}/values/{}",
                    urlencoding::encode(spreadsheet_id),
                    urlencoding::encode(range)
                ),
                &[("valueInputOption", "USER_ENTERED")],
                &body,
            )
            .await
    }
}
