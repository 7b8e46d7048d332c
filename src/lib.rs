//! Appium 移动端自动化工具调度
//!
//! 把 MCP 风格的工具调用（启动会话、查找元素、点击、输入、滚动等）
//! 转换为对 Appium 服务器的 W3C WebDriver 请求。

pub mod agent;
pub mod api;
pub mod appium;
pub mod config;
pub mod error;
pub mod logger;
pub mod mcp;
pub mod session;
pub mod tools;

pub use error::{AppError, Result};
