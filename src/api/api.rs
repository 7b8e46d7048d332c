use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::session::SessionInfo;
use crate::tools::{ErrorInfo, ErrorKind, ToolDefinition, ToolDispatcher, ToolResult};

/// 工具列表响应
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
    pub count: usize,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub struct ApiServer {
    pub app: Router,
}

impl ApiServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        let app = Router::new()
            .route("/tools", get(Self::list_tools))
            .route("/tools/{name}", post(Self::call_tool))
            .route("/session", get(Self::get_session))
            .route("/health", get(Self::health))
            .layer(CorsLayer::permissive())
            .with_state(dispatcher);
        ApiServer { app }
    }

    /// 启动 API 服务器
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Server(format!("无法绑定 {}: {}", addr, e)))?;
        info!("HTTP API 已启动: http://{}", addr);

        axum::serve(listener, self.app)
            .await
            .map_err(|e| AppError::Server(e.to_string()))
    }

    /// 获取工具列表
    async fn list_tools(State(dispatcher): State<Arc<ToolDispatcher>>) -> Json<ToolsResponse> {
        let tools = dispatcher.definitions();
        let count = tools.len();
        Json(ToolsResponse { tools, count })
    }

    /// 调用工具，请求体即工具参数
    async fn call_tool(
        State(dispatcher): State<Arc<ToolDispatcher>>,
        Path(name): Path<String>,
        body: Bytes,
    ) -> (StatusCode, Json<ToolResult>) {
        debug!("收到工具调用请求: {}", name);
        let arguments = match Self::parse_arguments(&body) {
            Ok(arguments) => arguments,
            Err(info) => {
                let result = ToolResult::failure(info);
                return (Self::status_for(&result), Json(result));
            }
        };
        let result = dispatcher.invoke(&name, arguments).await;
        (Self::status_for(&result), Json(result))
    }

    /// 请求体为空视为无参数，不依赖 Content-Type
    fn parse_arguments(body: &[u8]) -> std::result::Result<Value, ErrorInfo> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body).map_err(|e| {
            ErrorInfo::new(ErrorKind::InvalidArguments, format!("请求体不是合法 JSON: {}", e))
        })
    }

    /// 获取会话快照
    async fn get_session(State(dispatcher): State<Arc<ToolDispatcher>>) -> Json<SessionInfo> {
        Json(dispatcher.session_info().await)
    }

    async fn health() -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        })
    }

    /// 工具失败映射到 HTTP 状态码，响应体始终是 ToolResult
    fn status_for(result: &ToolResult) -> StatusCode {
        match result.error_kind() {
            None => StatusCode::OK,
            Some(ErrorKind::InvalidArguments) => StatusCode::BAD_REQUEST,
            Some(ErrorKind::NoActiveSession) | Some(ErrorKind::SessionStartFailed) => {
                StatusCode::CONFLICT
            }
            Some(ErrorKind::ElementNotFound) | Some(ErrorKind::InvalidHandle) => {
                StatusCode::NOT_FOUND
            }
            Some(ErrorKind::SessionExpired) => StatusCode::GONE,
            Some(ErrorKind::RemoteUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Some(ErrorKind::ProtocolError) | Some(ErrorKind::CommandFailed) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
