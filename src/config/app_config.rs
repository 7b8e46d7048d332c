use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "APPIUM_MCP_CONFIG";

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "appium-mcp.toml";

/// Appium 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务器地址
    pub url: String,

    /// 普通命令超时（秒）
    pub command_timeout_secs: u64,

    /// 创建会话超时（秒），设备启动通常较慢
    pub session_start_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4723".to_string(),
            command_timeout_secs: 60,
            session_start_timeout_secs: 300,
        }
    }
}

/// 会话能力默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// 服务器等待下一条命令的超时（秒）
    pub new_command_timeout: u64,

    /// 启动时不重置应用状态
    pub no_reset: bool,

    /// iOS 平台版本
    pub ios_platform_version: String,

    /// Android 浏览器会话自动下载 chromedriver
    pub chromedriver_autodownload: bool,

    /// 额外合并到每个会话的能力
    pub extra: Map<String, Value>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            new_command_timeout: 300,
            no_reset: true,
            ios_platform_version: "17.0".to_string(),
            chromedriver_autodownload: true,
            extra: Map::new(),
        }
    }
}

/// 工具行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// 页面源码截断长度（字符）
    pub page_source_max_len: usize,

    /// 滚动手势持续时间（毫秒）
    pub scroll_duration_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            page_source_max_len: 30000,
            scroll_duration_ms: 250,
        }
    }
}

/// 对外服务方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// 通过标准输入输出提供 MCP 服务
    Stdio,
    /// 通过 HTTP 提供工具调用接口
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub http_addr: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Stdio,
            http_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 调试模式，只影响日志详细程度
    pub debug: bool,

    /// 日志文件目录，未配置时只输出到 stderr
    pub log_dir: Option<String>,
}

/// 完整的应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub capabilities: CapabilityConfig,
    pub tools: ToolConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 从文件加载，并使用环境变量覆盖
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 进程启动时加载配置：配置文件不存在时使用默认值
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&path).exists() {
            Self::from_file_with_env(&path)
        } else {
            let mut config = Self::default();
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
    }

    /// 使用环境变量覆盖配置
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("APPIUM_SERVER_URL") {
            self.server.url = url;
        }

        if let Some(flag) = lookup("APPIUM_MCP_DEBUG") {
            self.logging.debug = parse_flag(&flag)?;
        }

        if let Some(kind) = lookup("APPIUM_MCP_TRANSPORT") {
            self.transport.kind = match kind.trim().to_lowercase().as_str() {
                "stdio" => TransportKind::Stdio,
                "http" => TransportKind::Http,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "不支持的传输方式: {}",
                        other
                    )));
                }
            };
        }

        if let Some(addr) = lookup("APPIUM_MCP_HTTP_ADDR") {
            self.transport.http_addr = addr;
        }

        self.validate()
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.url.starts_with("http://") || self.server.url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "服务器地址必须以 http:// 或 https:// 开头: {}",
                self.server.url
            )));
        }
        if self.server.command_timeout_secs == 0 || self.server.session_start_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("超时时间必须大于 0".to_string()));
        }
        if self.tools.page_source_max_len == 0 {
            return Err(ConfigError::ValidationError(
                "page_source_max_len 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        other => Err(ConfigError::ValidationError(format!("无效的开关值: {}", other))),
    }
}

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("验证错误: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.url, "http://localhost:4723");
        assert_eq!(config.capabilities.new_command_timeout, 300);
        assert!(config.capabilities.no_reset);
        assert_eq!(config.tools.page_source_max_len, 30000);
        assert_eq!(config.transport.kind, TransportKind::Stdio);
        assert!(!config.logging.debug);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            url = "http://10.0.0.5:4723/wd/hub"

            [capabilities]
            ios_platform_version = "18.2"

            [capabilities.extra]
            language = "en"

            [transport]
            kind = "http"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url, "http://10.0.0.5:4723/wd/hub");
        assert_eq!(config.server.command_timeout_secs, 60);
        assert_eq!(config.capabilities.ios_platform_version, "18.2");
        assert_eq!(config.capabilities.extra["language"], "en");
        assert_eq!(config.transport.kind, TransportKind::Http);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("APPIUM_SERVER_URL", "http://appium.local:4723"),
            ("APPIUM_MCP_DEBUG", "on"),
            ("APPIUM_MCP_TRANSPORT", "HTTP"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.url, "http://appium.local:4723");
        assert!(config.logging.debug);
        assert_eq!(config.transport.kind, TransportKind::Http);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[server]\nurl = \"localhost:4723\""),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[server\nurl ="),
            Err(ConfigError::ParseError(_))
        ));

        let mut config = AppConfig::default();
        let result = config.apply_env(|key| (key == "APPIUM_MCP_DEBUG").then(|| "maybe".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("appium-mcp-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "[tools]\npage_source_max_len = 5000\n\n[logging]\nlog_dir = \"logs\"\n",
        )
        .unwrap();
        let loaded = AppConfig::from_file(&path);
        let _ = fs::remove_file(&path);
        let loaded = loaded.unwrap();

        assert_eq!(loaded.tools.page_source_max_len, 5000);
        assert_eq!(loaded.logging.log_dir.as_deref(), Some("logs"));
        assert_eq!(loaded.server.url, AppConfig::default().server.url);

        assert!(matches!(
            AppConfig::from_file(std::env::temp_dir().join("appium-mcp-missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
