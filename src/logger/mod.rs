//! 日志初始化
//!
//! 标准输出保留给 MCP 协议，日志一律写到标准错误；
//! 配置了 `log_dir` 时另外按天滚动写入文件。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{AppError, Result};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "appium-mcp.log";

/// 未设置 RUST_LOG 时的默认过滤规则
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "appium_mcp_rs=debug,tower_http=debug"
    } else {
        "appium_mcp_rs=info"
    }
}

/// 初始化全局日志，返回的 guard 需要持有到进程退出
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config.debug)));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    Ok(guard)
}
