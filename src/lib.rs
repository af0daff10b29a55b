//! Google Workspace MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Drive, Gmail, Sheets, Docs and
//! Calendar that works across several Google accounts at once. Accounts are kept in
//! an [`accounts::AccountRegistry`]; each tool call is routed to one account
//! (chosen from an optional hint) or fanned out to all of them.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod google;
pub mod handlers;
pub mod mcp;

pub use config::Config;
pub use error::{Result, WorkspaceMcpError};
