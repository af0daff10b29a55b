//! Google Drive v3 client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::token_source::TokenSource;
use crate::config::google::DRIVE_API;
use crate::dispatch::pool::ServiceClient;
use crate::error::Result;
use crate::google::{ApiTransport, ClientSettings, Service};

const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,size,webViewLink,parents,starred,trashed";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A Drive file or folder
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    /// Size in bytes, reported by Drive as a decimal string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,

    #[serde(default)]
    pub starred: bool,

    #[serde(default)]
    pub trashed: bool,
}

/// One page of files
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Parameters of a file listing
#[derive(Debug, Clone, Default)]
pub struct ListFilesRequest {
    /// Drive query (`q`), e.g. `'root' in parents`
    pub query: Option<String>,
    pub page_size: Option<u32>,
    pub order_by: Option<String>,
    pub page_token: Option<String>,
}

/// Drive client for one account
#[derive(Clone)]
pub struct DriveClient {
    transport: ApiTransport,
}

impl ServiceClient for DriveClient {
    const SERVICE: Service = Service::Drive;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            transport: settings.transport(Service::Drive, DRIVE_API, tokens),
        })
    }
}

impl DriveClient {
    /// List files matching `request`; trashed files are excluded unless the
    /// query says otherwise
    pub async fn list_files(&self, request: &ListFilesRequest) -> Result<FileList> {
        let q = match request.query.as_deref() {
            Some(q) if q.contains("trashed") => q.to_string(),
            Some(q) if !q.trim().is_empty() => format!("({}) and trashed = false", q),
            _ => "trashed = false".to_string(),
        };
        let page_size = request.page_size.unwrap_or(20).clamp(1, 1000).to_string();
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);

        let mut query: Vec<(&str, &str)> = vec![
            ("q", q.as_str()),
            ("pageSize", page_size.as_str()),
            ("fields", fields.as_str()),
        ];
        if let Some(order_by) = request.order_by.as_deref() {
            query.push(("orderBy", order_by));
        }
        if let Some(token) = request.page_token.as_deref() {
            query.push(("pageToken", token));
        }

        self.transport.get("files", &query).await
    }

    /// Full-text search over names and content
    pub async fn search_files(&self, text: &str, page_size: Option<u32>) -> Result<FileList> {
        let request = ListFilesRequest {
            query: Some(format!(
                "name contains '{0}' or fullText contains '{0}'",
                escape_query(text)
            )),
            page_size,
            ..ListFilesRequest::default()
        };
        self.list_files(&request).await
    }

    /// Most recently modified files
    pub async fn recent_files(&self, page_size: u32) -> Result<FileList> {
        let request = ListFilesRequest {
            page_size: Some(page_size),
            order_by: Some("modifiedTime desc".to_string()),
            ..ListFilesRequest::default()
        };
        self.list_files(&request).await
    }

    pub async fn starred_files(&self, page_size: u32) -> Result<FileList> {
        let request = ListFilesRequest {
            query: Some("starred = true".to_string()),
            page_size: Some(page_size),
            order_by: Some("modifiedTime desc".to_string()),
            ..ListFilesRequest::default()
        };
        self.list_files(&request).await
    }

    /// Metadata of a single file
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        self.transport
            .get(
                &format!("files/{}", urlencoding::encode(file_id)),
                &[("fields", FILE_FIELDS)],
            )
            .await
    }

    /// Create a folder, optionally inside `parent_id`
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<DriveFile> {
        let mut body = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            body["parents"] = json!([parent]);
        }
        self.transport
            .post(&format!("files?fields={}", FILE_FIELDS), &body)
            .await
    }

    /// Move a file to the trash
    pub async fn trash_file(&self, file_id: &str) -> Result<DriveFile> {
        self.transport
            .patch(
                &format!(
                    "files/{}?fields={}",
                    urlencoding::encode(file_id),
                    FILE_FIELDS
                ),
                &json!({ "trashed": true }),
            )
            .await
    }
}

/// Escape a literal for use inside a single-quoted Drive query string
fn escape_query(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}
