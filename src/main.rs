use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use appium_mcp_rs::api::ApiServer;
use appium_mcp_rs::appium::AppiumClient;
use appium_mcp_rs::config::{AppConfig, TransportKind};
use appium_mcp_rs::logger;
use appium_mcp_rs::mcp::McpServer;
use appium_mcp_rs::session::QuitOutcome;
use appium_mcp_rs::tools::ToolDispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("加载配置失败")?;

    // guard 释放时才会刷新日志文件
    let _log_guard = logger::init(&config.logging)?;

    info!("Appium 服务器: {}", config.server.url);

    let client = AppiumClient::new(&config.server).context("创建 Appium 客户端失败")?;
    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(client),
        config.capabilities.clone(),
        config.tools.clone(),
    ));

    let served = match config.transport.kind {
        TransportKind::Stdio => {
            let server = McpServer::new(Arc::clone(&dispatcher));
            tokio::select! {
                result = server.run_stdio() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("收到中断信号");
                    Ok(())
                }
            }
        }
        TransportKind::Http => {
            let server = ApiServer::new(Arc::clone(&dispatcher));
            tokio::select! {
                result = server.run(&config.transport.http_addr) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("收到中断信号");
                    Ok(())
                }
            }
        }
    };

    if let QuitOutcome::Terminated { session_id, .. } = dispatcher.shutdown().await {
        info!("退出前结束会话: {:?}", session_id);
    }

    if let Err(e) = &served {
        warn!("服务异常退出: {}", e);
    }
    served.context("传输层运行失败")?;

    info!("已退出");
    Ok(())
}
