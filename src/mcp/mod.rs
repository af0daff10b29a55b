//! MCP (Model Context Protocol) module
//!
//! JSON-RPC types, the handler trait and the stdio server.

pub mod server;
pub mod tools;
pub mod types;

pub use server::McpServer;
pub use tools::ServiceHandler;
