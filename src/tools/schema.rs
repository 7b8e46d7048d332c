//! 工具定义与参数校验

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::appium::{Locator, LocatorStrategy};
use crate::session::{LaunchTarget, Platform, ScrollDirection, SessionRequest};

/// 旧版 MCP 工具名前缀
pub const LEGACY_TOOL_PREFIX: &str = "appium_";

/// 参数错误
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("未知工具: {0}")]
    UnknownTool(String),

    #[error("参数格式错误: {0}")]
    Malformed(String),

    #[error("参数无效: {0}")]
    Invalid(String),
}

/// 支持的工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    StartSession,
    GetSessionInfo,
    QuitSession,
    FindElement,
    TapElement,
    InputText,
    GetText,
    GetPageSource,
    Scroll,
}

impl ToolName {
    pub const ALL: [ToolName; 9] = [
        ToolName::StartSession,
        ToolName::GetSessionInfo,
        ToolName::QuitSession,
        ToolName::FindElement,
        ToolName::TapElement,
        ToolName::InputText,
        ToolName::GetText,
        ToolName::GetPageSource,
        ToolName::Scroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::StartSession => "start_session",
            ToolName::GetSessionInfo => "get_session_info",
            ToolName::QuitSession => "quit_session",
            ToolName::FindElement => "find_element",
            ToolName::TapElement => "tap_element",
            ToolName::InputText => "input_text",
            ToolName::GetText => "get_text",
            ToolName::GetPageSource => "get_page_source",
            ToolName::Scroll => "scroll",
        }
    }

    /// 是否需要活动会话
    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            ToolName::StartSession | ToolName::GetSessionInfo | ToolName::QuitSession
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::StartSession => "Start an Appium session on an iOS or Android device. Only one session may be active at a time.",
            ToolName::GetSessionInfo => "Get information about the current session, or status 'none' when no session is active.",
            ToolName::QuitSession => "Quit the current session. Safe to call when no session is active.",
            ToolName::FindElement => "Find an element on the screen and return an element_id handle for later tap/input calls.",
            ToolName::TapElement => "Tap an element previously returned by find_element.",
            ToolName::InputText => "Send text to an element, either by element_id or by locating it with strategy and value.",
            ToolName::GetText => "Get the visible text content of an element previously returned by find_element.",
            ToolName::GetPageSource => "Get the current page source (truncated unless full is true).",
            ToolName::Scroll => "Scroll the screen up or down.",
        }
    }

    /// 工具参数的 JSON Schema
    pub fn input_schema(&self) -> Value {
        let strategies = LocatorStrategy::allowed_values();
        match self {
            ToolName::StartSession => json!({
                "type": "object",
                "properties": {
                    "platform": { "type": "string", "enum": ["iOS", "Android"], "description": "Platform name" },
                    "device_name": { "type": "string", "description": "Device name or UDID" },
                    "app_path": { "type": "string", "description": "Path to the application to install and launch" },
                    "bundle_id": { "type": "string", "description": "iOS bundle ID of an installed app" },
                    "app_package": { "type": "string", "description": "Android app package name" },
                    "app_activity": { "type": "string", "description": "Android app activity name" },
                    "start_url": { "type": "string", "description": "URL to open when no app is given and the browser is launched" }
                },
                "required": ["platform", "device_name"]
            }),
            ToolName::GetSessionInfo | ToolName::QuitSession => json!({
                "type": "object",
                "properties": {}
            }),
            ToolName::FindElement => json!({
                "type": "object",
                "properties": {
                    "strategy": { "type": "string", "enum": strategies, "description": "Locator strategy" },
                    "value": { "type": "string", "description": "Locator value" }
                },
                "required": ["strategy", "value"]
            }),
            ToolName::TapElement | ToolName::GetText => json!({
                "type": "object",
                "properties": {
                    "element_id": { "type": "string", "description": "Element ID returned by find_element" }
                },
                "required": ["element_id"]
            }),
            ToolName::InputText => json!({
                "type": "object",
                "properties": {
                    "element_id": { "type": "string", "description": "Element ID returned by find_element" },
                    "text": { "type": "string", "description": "The text to input" },
                    "strategy": { "type": "string", "enum": strategies, "description": "Locator strategy when no element_id is given" },
                    "value": { "type": "string", "description": "Locator value when no element_id is given" }
                },
                "required": ["text"]
            }),
            ToolName::GetPageSource => json!({
                "type": "object",
                "properties": {
                    "full": { "type": "boolean", "default": false, "description": "Return the full source without truncation" }
                }
            }),
            ToolName::Scroll => json!({
                "type": "object",
                "properties": {
                    "direction": { "type": "string", "enum": ["up", "down"], "default": "down", "description": "Scroll direction" }
                }
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl FromStr for ToolName {
    type Err = ArgumentError;

    /// 同时接受 `find_element` 与 `appium_find_element`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix(LEGACY_TOOL_PREFIX).unwrap_or(s);
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == bare)
            .ok_or_else(|| ArgumentError::UnknownTool(s.to_string()))
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对外公布的工具定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// 全部工具定义
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}

/// 把参数反序列化为具体结构，`null` 视为空对象
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ArgumentError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(ArgumentError::Malformed(format!("参数必须是 JSON 对象，实际为: {}", other)));
        }
    };
    serde_json::from_value(arguments).map_err(|e| ArgumentError::Malformed(e.to_string()))
}

/// 空字符串视为未提供
fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ArgumentError> {
    if value.trim().is_empty() {
        return Err(ArgumentError::Invalid(format!("{} 不能为空", field)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct StartSessionArgs {
    pub platform: String,
    pub device_name: String,
    pub app_path: Option<String>,
    pub bundle_id: Option<String>,
    pub app_package: Option<String>,
    pub app_activity: Option<String>,
    pub start_url: Option<String>,
}

impl StartSessionArgs {
    /// 校验平台与启动目标，启动选择器互斥
    pub fn into_request(self) -> Result<SessionRequest, ArgumentError> {
        let platform: Platform = self.platform.parse().map_err(ArgumentError::Invalid)?;
        require_non_empty("device_name", &self.device_name)?;

        let app_path = non_empty(self.app_path);
        let bundle_id = non_empty(self.bundle_id);
        let app_package = non_empty(self.app_package);
        let app_activity = non_empty(self.app_activity);
        let start_url = non_empty(self.start_url);

        let android_app = match (app_package, app_activity) {
            (Some(package), Some(activity)) => Some((package, activity)),
            (None, None) => None,
            _ => {
                return Err(ArgumentError::Invalid(
                    "app_package 与 app_activity 必须同时提供".to_string(),
                ));
            }
        };

        let selectors = [app_path.is_some(), bundle_id.is_some(), android_app.is_some()]
            .into_iter()
            .filter(|present| *present)
            .count();
        if selectors > 1 {
            return Err(ArgumentError::Invalid(
                "app_path、bundle_id、app_package/app_activity 只能提供一种".to_string(),
            ));
        }

        let launch_target = match (app_path, bundle_id, android_app) {
            (Some(path), _, _) => LaunchTarget::AppPath { path },
            (_, Some(bundle_id), _) => {
                if platform != Platform::Ios {
                    return Err(ArgumentError::Invalid("bundle_id 仅适用于 iOS".to_string()));
                }
                LaunchTarget::BundleId { bundle_id }
            }
            (_, _, Some((package, activity))) => {
                if platform != Platform::Android {
                    return Err(ArgumentError::Invalid(
                        "app_package/app_activity 仅适用于 Android".to_string(),
                    ));
                }
                LaunchTarget::AndroidApp { package, activity }
            }
            (None, None, None) => LaunchTarget::Browser,
        };

        if start_url.is_some() && !launch_target.is_browser() {
            return Err(ArgumentError::Invalid(
                "start_url 只能用于浏览器会话（不指定应用）".to_string(),
            ));
        }

        Ok(SessionRequest {
            platform,
            device_name: self.device_name.trim().to_string(),
            launch_target,
            start_url,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FindElementArgs {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl FindElementArgs {
    pub fn into_locator(self) -> Result<Locator, ArgumentError> {
        require_non_empty("value", &self.value)?;
        Ok(Locator::new(self.strategy, self.value))
    }
}

#[derive(Debug, Deserialize)]
pub struct ElementArgs {
    pub element_id: String,
}

impl ElementArgs {
    pub fn validate(self) -> Result<String, ArgumentError> {
        require_non_empty("element_id", &self.element_id)?;
        Ok(self.element_id)
    }
}

/// input_text 的目标元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputTarget {
    Handle(String),
    Locate(Locator),
}

#[derive(Debug, Deserialize)]
pub struct InputTextArgs {
    pub text: String,
    pub element_id: Option<String>,
    pub strategy: Option<LocatorStrategy>,
    pub value: Option<String>,
}

impl InputTextArgs {
    pub fn into_target(self) -> Result<(InputTarget, String), ArgumentError> {
        let target = match (non_empty(self.element_id), self.strategy, non_empty(self.value)) {
            (Some(element_id), None, None) => InputTarget::Handle(element_id),
            (None, Some(strategy), Some(value)) => InputTarget::Locate(Locator::new(strategy, value)),
            (Some(_), _, _) => {
                return Err(ArgumentError::Invalid(
                    "element_id 与 strategy/value 不能同时提供".to_string(),
                ));
            }
            _ => {
                return Err(ArgumentError::Invalid(
                    "必须提供 element_id，或同时提供 strategy 与 value".to_string(),
                ));
            }
        };
        Ok((target, self.text))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageSourceArgs {
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrollArgs {
    #[serde(default)]
    pub direction: ScrollDirection,
}
