use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::error;

use crate::appium::RemoteError;
use crate::session::SessionError;

/// 工具调用错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 参数不符合工具约定
    InvalidArguments,
    /// 需要先启动会话
    NoActiveSession,
    /// 设备或驱动不可用、启动目标无效
    SessionStartFailed,
    /// 元素尚未出现，可稍后重试
    ElementNotFound,
    /// 句柄未知或已失效，需要重新查找
    InvalidHandle,
    /// 无法访问自动化服务器
    RemoteUnavailable,
    /// 服务器响应格式异常
    ProtocolError,
    /// 服务器端会话已不存在，需要重新启动会话
    SessionExpired,
    /// 服务器拒绝执行命令
    CommandFailed,
}

impl ErrorKind {
    /// 调用方是否可以原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ElementNotFound | ErrorKind::RemoteUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&RemoteError> for ErrorKind {
    fn from(error: &RemoteError) -> Self {
        match error {
            RemoteError::Unavailable(_) | RemoteError::Timeout(_) => ErrorKind::RemoteUnavailable,
            RemoteError::NoSuchElement(_) => ErrorKind::ElementNotFound,
            RemoteError::StaleElement(_) => ErrorKind::InvalidHandle,
            RemoteError::InvalidSession(_) => ErrorKind::SessionExpired,
            RemoteError::SessionNotCreated(_) => ErrorKind::SessionStartFailed,
            RemoteError::WebDriver { .. } => ErrorKind::CommandFailed,
            RemoteError::Protocol(_) => ErrorKind::ProtocolError,
        }
    }
}

impl From<&SessionError> for ErrorKind {
    fn from(error: &SessionError) -> Self {
        match error {
            SessionError::NoActiveSession => ErrorKind::NoActiveSession,
            SessionError::StartFailed(_) => ErrorKind::SessionStartFailed,
            SessionError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            SessionError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            SessionError::Remote(remote) => ErrorKind::from(remote),
        }
    }
}

/// 错误详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }
}

impl From<SessionError> for ErrorInfo {
    fn from(error: SessionError) -> Self {
        let kind = ErrorKind::from(&error);
        if kind == ErrorKind::ProtocolError {
            error!("自动化服务器响应异常: {}", error);
        }
        ErrorInfo::new(kind, error.to_string())
    }
}

/// 每次工具调用返回的统一结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// 失败且可重试
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }
}
