use thiserror::Error;

use crate::config::ConfigError;

/// 应用程序统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 传输层错误
    #[error("服务器错误: {0}")]
    Server(String),

    /// 日志初始化失败
    #[error("日志初始化失败: {0}")]
    Logging(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// AppError 的 Result 类型别名
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// 将错误转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Config(_) => 500,
            AppError::Server(_) => 500,
            AppError::Logging(_) => 500,
            AppError::IoError(_) => 500,
            AppError::JsonError(_) => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AppError::from(json_err).status_code(), 400);
        assert_eq!(AppError::Server("bind".to_string()).status_code(), 500);

        let config_err = ConfigError::ValidationError("bad".to_string());
        let app_err = AppError::from(config_err);
        assert!(app_err.to_string().contains("配置错误"));
    }
}
