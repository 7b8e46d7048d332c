//! 工具层：参数校验、路由与统一的结果封装

pub mod dispatcher;
pub mod result;
pub mod schema;

pub use dispatcher::ToolDispatcher;
pub use result::{ErrorInfo, ErrorKind, ToolResult};
pub use schema::{tool_definitions, ToolDefinition, ToolName};
