//! MCP 传输层（stdio 上的 JSON-RPC 2.0）

pub mod server;

pub use server::{McpAction, McpServer};
