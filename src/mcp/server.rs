use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tools::{ToolDispatcher, ToolResult};

/// 客户端未声明时使用的协议版本
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "appium-mcp";

/// 能力模板资源
pub const CAPABILITIES_URI: &str = "appium://capabilities";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// 处理一条消息后的动作
#[derive(Debug, Clone, PartialEq)]
pub enum McpAction {
    /// 写回响应
    Reply(Value),
    /// 通知消息，不需要响应
    Ignore,
    /// 写回响应后退出
    Shutdown(Value),
}

/// 基于换行分隔 JSON-RPC 的 MCP 服务器
pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// 在标准输入输出上运行，标准输出只用于协议消息
    pub async fn run_stdio(&self) -> Result<()> {
        info!("MCP 服务器已启动（stdio）");
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// 逐行读取请求直到输入结束或收到 shutdown
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match self.handle_line(&line).await {
                McpAction::Reply(response) => write_message(&mut writer, &response).await?,
                McpAction::Ignore => {}
                McpAction::Shutdown(response) => {
                    write_message(&mut writer, &response).await?;
                    info!("收到 shutdown，MCP 服务器退出");
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn handle_line(&self, line: &str) -> McpAction {
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("无法解析的消息: {}", e);
                McpAction::Reply(error_response(Value::Null, PARSE_ERROR, &format!("parse error: {}", e)))
            }
        }
    }

    pub async fn handle_message(&self, message: Value) -> McpAction {
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let has_id = !id.is_null();
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        debug!("MCP 请求: {}", method);

        match method {
            "initialize" => {
                let protocol = params
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL_VERSION);
                McpAction::Reply(success_response(
                    id,
                    json!({
                        "protocolVersion": protocol,
                        "capabilities": { "tools": {}, "resources": {} },
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                ))
            }
            "ping" => McpAction::Reply(success_response(id, json!({}))),
            "tools/list" => McpAction::Reply(success_response(
                id,
                json!({ "tools": self.dispatcher.definitions() }),
            )),
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return McpAction::Reply(error_response(id, INVALID_PARAMS, "missing tool name"));
                };
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                let result = self.dispatcher.invoke(name, arguments).await;
                McpAction::Reply(success_response(id, call_result(&result)))
            }
            "resources/list" => McpAction::Reply(success_response(
                id,
                json!({
                    "resources": [{
                        "uri": CAPABILITIES_URI,
                        "name": "Appium Capabilities",
                        "description": "Available Appium capabilities and configurations",
                        "mimeType": "application/json"
                    }]
                }),
            )),
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
                if uri != CAPABILITIES_URI {
                    return McpAction::Reply(error_response(
                        id,
                        INVALID_PARAMS,
                        &format!("unknown resource: {}", uri),
                    ));
                }
                let text = match serde_json::to_string_pretty(&self.dispatcher.capability_templates()) {
                    Ok(text) => text,
                    Err(e) => {
                        return McpAction::Reply(error_response(id, INTERNAL_ERROR, &e.to_string()));
                    }
                };
                McpAction::Reply(success_response(
                    id,
                    json!({
                        "contents": [{
                            "uri": CAPABILITIES_URI,
                            "mimeType": "application/json",
                            "text": text
                        }]
                    }),
                ))
            }
            "shutdown" => McpAction::Shutdown(success_response(id, Value::Null)),
            _ if !has_id => {
                debug!("忽略通知: {}", method);
                McpAction::Ignore
            }
            _ => McpAction::Reply(error_response(
                id,
                METHOD_NOT_FOUND,
                &format!("method not found: {}", method),
            )),
        }
    }
}

/// ToolResult 以格式化 JSON 文本块返回
fn call_result(result: &ToolResult) -> Value {
    let text = serde_json::to_string_pretty(result)
        .unwrap_or_else(|e| format!("{{\"ok\":false,\"error\":\"{}\"}}", e));
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": !result.ok
    })
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
