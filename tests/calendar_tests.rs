//! Calendar tools through the MCP server
//!
//! Only paths that stop before a request reaches Google are exercised:
//! argument validation and account resolution.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use common::{add_account, registry, settings, MockOAuth};
use google_workspace_mcp::dispatch::{ClientPool, Dispatcher};
use google_workspace_mcp::google::calendar::CalendarClient;
use google_workspace_mcp::handlers::CalendarHandler;
use google_workspace_mcp::mcp::{McpServer, ServiceHandler};

async fn calendar_server(emails: &[&str]) -> (McpServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockOAuth::new();
    let registry = registry(dir.path(), provider.clone());
    for email in emails {
        add_account(&registry, &provider, email, "Test").await;
    }

    let pool = Arc::new(ClientPool::<CalendarClient>::new(registry.clone(), settings()).await);
    let dispatcher = Dispatcher::new(registry, pool, Duration::from_secs(2));
    let handlers: Vec<Arc<dyn ServiceHandler>> = vec![Arc::new(CalendarHandler::new(dispatcher))];
    (McpServer::new(handlers), dir)
}

/// Call a tool and return (is_error, text)
async fn call_tool(server: &mut McpServer, name: &str, arguments: Value) -> (bool, String) {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    let response = server
        .handle_message(&request.to_string())
        .await
        .unwrap()
        .unwrap();
    let response = serde_json::to_value(response).unwrap();
    let result = &response["result"];
    (
        result["isError"].as_bool().unwrap_or(false),
        result["content"][0]["text"].as_str().unwrap_or_default().to_string(),
    )
}

#[tokio::test]
async fn test_calendar_tools_are_listed() {
    let (mut server, _dir) = calendar_server(&[]).await;
    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });
    let response = server.handle_message(&request.to_string()).await.unwrap().unwrap();
    let response = serde_json::to_value(response).unwrap();

    let names: Vec<String> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec![
            "calendar_list",
            "calendar_events_list",
            "calendar_event_create",
            "calendar_events_list_all_accounts"
        ]
    );
}

#[tokio::test]
async fn test_event_create_validates_times() {
    let (mut server, _dir) = calendar_server(&["a@x.com"]).await;

    let (is_error, text) = call_tool(
        &mut server,
        "calendar_event_create",
        json!({
            "calendar_id": "primary",
            "summary": "Standup",
            "start_time": "monday at nine",
            "end_time": "2026-03-02T09:15:00Z"
        }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("start_time must be an RFC 3339 timestamp"), "{text}");

    let (is_error, text) = call_tool(
        &mut server,
        "calendar_event_create",
        json!({
            "calendar_id": "primary",
            "summary": "Standup",
            "start_time": "2026-03-02T09:15:00Z",
            "end_time": "2026-03-02T09:00:00Z"
        }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("end_time must be after start_time"), "{text}");

    let (is_error, text) = call_tool(
        &mut server,
        "calendar_event_create",
        json!({ "calendar_id": "primary", "summary": "Standup" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("Invalid tool arguments"), "{text}");
}

#[tokio::test]
async fn test_events_list_needs_an_account() {
    let (mut server, _dir) = calendar_server(&[]).await;
    let (is_error, text) =
        call_tool(&mut server, "calendar_events_list", json!({ "calendar_id": "primary" })).await;
    assert!(is_error);
    assert!(text.contains("no authenticated accounts"), "{text}");

    let (mut server, _dir) = calendar_server(&["a@x.com", "b@y.com"]).await;
    let (is_error, text) =
        call_tool(&mut server, "calendar_events_list", json!({ "calendar_id": "primary" })).await;
    assert!(is_error);
    assert!(text.contains("a@x.com, b@y.com"), "{text}");
}

#[tokio::test]
async fn test_list_all_accounts_rejects_bad_range() {
    let (mut server, _dir) = calendar_server(&["a@x.com"]).await;
    let (is_error, text) = call_tool(
        &mut server,
        "calendar_events_list_all_accounts",
        json!({ "time_min": "yesterday" }),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("time_min"), "{text}");
}
