use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// W3C 规范中的元素引用键
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// JSONWP 旧协议中的元素引用键
pub const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// W3C 标准能力名，其余能力需要加 `appium:` 前缀
const STANDARD_CAPABILITIES: &[&str] = &[
    "browserName",
    "browserVersion",
    "platformName",
    "acceptInsecureCerts",
    "pageLoadStrategy",
    "proxy",
    "setWindowRect",
    "timeouts",
    "strictFileInteractability",
    "unhandledPromptBehavior",
    "webSocketUrl",
];

/// 元素定位策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Id,
    Xpath,
    ClassName,
    AccessibilityId,
}

impl LocatorStrategy {
    /// 转换为 WebDriver 协议中的 `using` 字段
    pub fn as_webdriver_using(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::ClassName => "class name",
            LocatorStrategy::AccessibilityId => "accessibility id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::ClassName => "class_name",
            LocatorStrategy::AccessibilityId => "accessibility_id",
        }
    }

    /// 工具参数中允许的全部取值
    pub fn allowed_values() -> [&'static str; 4] {
        ["id", "xpath", "class_name", "accessibility_id"]
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 元素定位条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: LocatorStrategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// 新建会话时提交的能力集合
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capabilities {
    entries: Map<String, Value>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一项能力，非 W3C 标准能力自动补上 `appium:` 前缀
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let key = if STANDARD_CAPABILITIES.contains(&name) || name.contains(':') {
            name.to_string()
        } else {
            format!("appium:{}", name)
        };
        self.entries.insert(key, value.into());
        self
    }

    /// 按原始名称读取（自动处理 `appium:` 前缀）
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(&format!("appium:{}", name)))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// 生成 `POST /session` 的请求体
    pub fn to_new_session_payload(&self) -> Value {
        serde_json::json!({
            "capabilities": {
                "alwaysMatch": self.entries,
                "firstMatch": [{}],
            }
        })
    }
}

/// 服务器创建会话后的返回结果
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub session_id: String,
    pub capabilities: Map<String, Value>,
}

/// 窗口位置与尺寸
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WindowRect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 单指滑动手势（视口坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwipeGesture {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
    pub duration_ms: u64,
}

impl SwipeGesture {
    /// 生成 W3C `POST /session/{id}/actions` 请求体
    pub fn to_actions_payload(&self) -> Value {
        serde_json::json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": "touch" },
                "actions": [
                    { "type": "pointerMove", "duration": 0, "x": self.start_x, "y": self.start_y, "origin": "viewport" },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pause", "duration": 100 },
                    { "type": "pointerMove", "duration": self.duration_ms, "x": self.end_x, "y": self.end_y, "origin": "viewport" },
                    { "type": "pointerUp", "button": 0 },
                ],
            }]
        })
    }
}

/// 远程自动化服务器调用错误
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// 连接失败或连接中断
    #[error("无法连接自动化服务器: {0}")]
    Unavailable(String),

    /// 请求超时
    #[error("自动化服务器响应超时: {0}")]
    Timeout(String),

    #[error("未找到元素: {0}")]
    NoSuchElement(String),

    #[error("元素引用已失效: {0}")]
    StaleElement(String),

    /// 服务器不认识该会话 ID
    #[error("会话已失效: {0}")]
    InvalidSession(String),

    #[error("会话创建失败: {0}")]
    SessionNotCreated(String),

    /// 其他格式正确的 WebDriver 错误
    #[error("WebDriver 错误 [{code}]: {message}")]
    WebDriver { code: String, message: String },

    /// 响应格式不符合协议
    #[error("协议错误: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// 是否为传输层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout(_))
    }
}
