//! Tool and resource plumbing shared by the service handlers

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::{McpError, Result, WorkspaceMcpError};
use crate::mcp::types::{Resource, Tool};

/// A group of tools and resources served by one handler
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Tools this handler serves
    fn tools(&self) -> Vec<Tool>;

    /// Resources this handler serves
    fn resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// Execute tool `name`; the result is returned to the client as JSON text
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        Err(WorkspaceMcpError::Mcp(McpError::UnknownResource {
            uri: uri.to_string(),
        }))
    }
}

/// Build a tool definition
pub fn tool_def(name: &str, description: &str, schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: schema,
    }
}

/// Build a JSON resource definition
pub fn resource_def(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some("application/json".to_string()),
    }
}

/// Object schema with the given properties and required names
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Add the optional `account` hint to an object schema
pub fn with_account(mut schema: Value) -> Value {
    if let Some(properties) = schema.get_mut("properties").and_then(Value::as_object_mut) {
        properties.insert(
            "account".to_string(),
            json!({
                "type": "string",
                "description": "Account to use: an email address, a domain, or any text mentioning one. May be omitted when only one account is configured."
            }),
        );
    }
    schema
}

/// Deserialize tool arguments; a missing argument object counts as empty
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(WorkspaceMcpError::invalid_arguments)
}

pub fn unknown_tool(name: &str) -> WorkspaceMcpError {
    WorkspaceMcpError::Mcp(McpError::UnknownTool {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Args {
        account: Option<String>,
        #[serde(default)]
        limit: u32,
    }

    #[test]
    fn test_parse_null_arguments() {
        let args: Args = parse_args(Value::Null).unwrap();
        assert!(args.account.is_none());
        assert_eq!(args.limit, 0);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = parse_args::<Args>(json!({"limit": "ten"})).unwrap_err();
        assert!(matches!(err, WorkspaceMcpError::Mcp(McpError::InvalidArguments { .. })));
    }

    #[test]
    fn test_with_account_adds_property() {
        let schema = with_account(object_schema(json!({"file_id": {"type": "string"}}), &["file_id"]));
        assert!(schema["properties"]["account"].is_object());
        assert_eq!(schema["required"], json!(["file_id"]));
    }
}
