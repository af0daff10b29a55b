//! End-to-end MCP protocol tests
//!
//! The server is driven through `handle_message` with real handlers over a
//! temporary account directory. Google APIs are never reached: the tools
//! exercised here either stay inside the account layer or fail before any
//! request is sent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use common::{add_account, registry, settings, MockOAuth};
use google_workspace_mcp::accounts::AccountRegistry;
use google_workspace_mcp::dispatch::{AccountEvictor, ClientPool, Dispatcher};
use google_workspace_mcp::google::drive::DriveClient;
use google_workspace_mcp::handlers::{AccountsHandler, DriveHandler};
use google_workspace_mcp::mcp::{McpServer, ServiceHandler};

/// Helper to create a JSON-RPC request
fn make_request(id: i64, method: &str, params: Option<Value>) -> String {
    let mut request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(p) = params {
        request["params"] = p;
    }
    request.to_string()
}

struct Harness {
    server: McpServer,
    registry: Arc<AccountRegistry>,
    pool: Arc<ClientPool<DriveClient>>,
    _dir: tempfile::TempDir,
}

async fn harness(emails: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    for email in emails {
        add_account(&registry, &provider, email, "Test").await;
    }

    let pool = Arc::new(ClientPool::<DriveClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry.clone(), pool.clone(), Duration::from_secs(2));
    let evictor: Arc<dyn AccountEvictor> = pool.clone();

    let handlers: Vec<Arc<dyn ServiceHandler>> = vec![
        Arc::new(
            AccountsHandler::new(registry.clone(), "http://localhost:0/callback")
                .with_evictors(vec![evictor]),
        ),
        Arc::new(DriveHandler::new(dispatcher)),
    ];

    Harness {
        server: McpServer::new(handlers),
        registry,
        pool,
        _dir: dir,
    }
}

async fn request(h: &mut Harness, id: i64, method: &str, params: Option<Value>) -> Value {
    let response = h
        .server
        .handle_message(&make_request(id, method, params))
        .await
        .unwrap()
        .expect("request should produce a response");
    serde_json::to_value(response).unwrap()
}

/// Call a tool and return (is_error, text)
async fn call_tool(h: &mut Harness, name: &str, arguments: Value) -> (bool, String) {
    let response = request(
        h,
        10,
        "tools/call",
        Some(json!({ "name": name, "arguments": arguments })),
    )
    .await;
    let result = &response["result"];
    let is_error = result["isError"].as_bool().unwrap_or(false);
    let text = result["content"][0]["text"].as_str().unwrap_or_default().to_string();
    (is_error, text)
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let mut h = harness(&[]).await;

    let init = request(
        &mut h,
        1,
        "initialize",
        Some(json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": { "name": "test-client", "version": "1.0.0" },
            "capabilities": {}
        })),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "google-workspace");

    let tools = request(&mut h, 2, "tools/list", None).await;
    let tools = tools["result"]["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();

    for expected in [
        "accounts_list",
        "accounts_add",
        "accounts_remove",
        "drive_files_list",
        "drive_files_search_all_accounts",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }

    for tool in &tools {
        let name = tool["name"].as_str().unwrap();
        let has_account = tool["inputSchema"]["properties"]["account"].is_object();
        let single_account_tool = name.starts_with("drive_") && !name.ends_with("_all_accounts");
        assert_eq!(has_account, single_account_tool, "account hint on {name}");
    }
}

#[tokio::test]
async fn test_ping_and_unknown_method() {
    let mut h = harness(&[]).await;

    let pong = request(&mut h, 1, "ping", None).await;
    assert_eq!(pong["result"], json!({}));

    let unknown = request(&mut h, 2, "prompts/list", None).await;
    assert_eq!(unknown["error"]["code"], -32601);
}

#[tokio::test]
async fn test_parse_error() {
    let mut h = harness(&[]).await;
    let response = h.server.handle_message("{ not json").await.unwrap().unwrap();
    assert_eq!(response.error.unwrap().code, -32700);
}

#[tokio::test]
async fn test_accounts_list_orders_by_recent_use() {
    let mut h = harness(&["a@x.com", "b@y.com"]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.registry.get("a@x.com").await.unwrap();

    let (is_error, text) = call_tool(&mut h, "accounts_list", json!({})).await;
    assert!(!is_error, "{text}");

    let listed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(listed["count"], 2);
    assert_eq!(listed["accounts"][0]["email"], "a@x.com");
    assert_eq!(listed["accounts"][0]["active"], true);
}

#[tokio::test]
async fn test_accounts_details_for_one_account() {
    let mut h = harness(&["a@x.com"]).await;

    let (is_error, text) = call_tool(&mut h, "accounts_details", json!({ "email": "a@x.com" })).await;
    assert!(!is_error, "{text}");
    let details: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(details["email"], "a@x.com");
    assert_eq!(details["has_refresh_token"], true);

    let (is_error, text) = call_tool(&mut h, "accounts_details", json!({ "email": "ghost@x.com" })).await;
    assert!(is_error);
    assert!(text.contains("ghost@x.com"));
}

#[tokio::test]
async fn test_accounts_remove_validates_and_evicts() {
    let mut h = harness(&["a@x.com", "b@x.com"]).await;
    assert!(h.pool.get("a@x.com").await.is_some());

    let (is_error, text) = call_tool(&mut h, "accounts_remove", json!({ "email": "not-an-email" })).await;
    assert!(is_error);
    assert!(text.contains("Invalid email"));
    assert_eq!(h.registry.emails().await.len(), 2);

    let (is_error, text) = call_tool(&mut h, "accounts_remove", json!({ "email": "a@x.com" })).await;
    assert!(!is_error, "{text}");
    let removed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(removed["removed"], "a@x.com");
    assert_eq!(removed["remaining"], json!(["b@x.com"]));
    assert!(h.pool.get("a@x.com").await.is_none());

    let (is_error, _) = call_tool(&mut h, "accounts_remove", json!({ "email": "a@x.com" })).await;
    assert!(is_error);
}

#[tokio::test]
async fn test_service_tool_without_accounts_reports_error() {
    let mut h = harness(&[]).await;

    let (is_error, text) = call_tool(&mut h, "drive_files_list", json!({})).await;
    assert!(is_error);
    assert!(text.contains("no authenticated accounts"));

    let (is_error, text) = call_tool(&mut h, "drive_file_get_metadata", json!({})).await;
    assert!(is_error);
    assert!(text.contains("Invalid tool arguments"));
}

#[tokio::test]
async fn test_ambiguous_account_asks_for_a_hint() {
    let mut h = harness(&["a@x.com", "b@y.com"]).await;

    let (is_error, text) = call_tool(&mut h, "drive_files_list", json!({})).await;
    assert!(is_error);
    assert!(text.contains("a@x.com, b@y.com"));
}

#[tokio::test]
async fn test_resources() {
    let mut h = harness(&["a@x.com"]).await;

    let listed = request(&mut h, 1, "resources/list", None).await;
    let uris: Vec<&str> = listed["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["uri"].as_str())
        .collect();
    assert_eq!(uris, vec!["accounts://list", "drive://recent", "drive://starred"]);

    let read = request(&mut h, 2, "resources/read", Some(json!({ "uri": "accounts://list" }))).await;
    let text = read["result"]["contents"][0]["text"].as_str().unwrap();
    let accounts: Value = serde_json::from_str(text).unwrap();
    assert_eq!(accounts["count"], 1);
}
