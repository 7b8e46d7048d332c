use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::appium::{Capabilities, SwipeGesture, WindowRect};
use crate::config::CapabilityConfig;

/// 设备平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "Android")]
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::Android => "Android",
        }
    }

    /// 对应的 Appium 驱动
    pub fn automation_name(&self) -> &'static str {
        match self {
            Platform::Ios => "XCUITest",
            Platform::Android => "UiAutomator2",
        }
    }

    /// 未指定启动目标时使用的浏览器
    pub fn default_browser(&self) -> &'static str {
        match self {
            Platform::Ios => "Safari",
            Platform::Android => "Chrome",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    /// 不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(format!("不支持的平台: {}（可选值: iOS, Android）", other)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话启动目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchTarget {
    /// 安装并启动应用包
    AppPath { path: String },
    /// iOS 已安装应用
    BundleId { bundle_id: String },
    /// Android 已安装应用
    AndroidApp { package: String, activity: String },
    /// 不指定应用，只启动浏览器
    Browser,
}

impl LaunchTarget {
    pub fn is_browser(&self) -> bool {
        matches!(self, LaunchTarget::Browser)
    }

    pub fn describe(&self) -> String {
        match self {
            LaunchTarget::AppPath { path } => path.clone(),
            LaunchTarget::BundleId { bundle_id } => bundle_id.clone(),
            LaunchTarget::AndroidApp { package, activity } => format!("{}/{}", package, activity),
            LaunchTarget::Browser => "Browser".to_string(),
        }
    }
}

/// 启动会话的请求参数（已校验）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub platform: Platform,
    pub device_name: String,
    pub launch_target: LaunchTarget,
    /// 浏览器会话启动后打开的页面
    pub start_url: Option<String>,
}

/// 会话状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    None,
    Starting,
    Active,
    Terminating,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::None => write!(f, "none"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Terminating => write!(f, "terminating"),
        }
    }
}

/// 会话快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_target: Option<LaunchTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub element_count: usize,
}

impl SessionInfo {
    /// 无会话时的快照
    pub fn none() -> Self {
        Self {
            state: SessionState::None,
            session_id: None,
            platform: None,
            device_name: None,
            automation_name: None,
            launch_target: None,
            started_at: None,
            element_count: 0,
        }
    }
}

/// 滚动方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }

    /// 沿窗口竖直中线滑动：向下滚动从 80% 高度滑到 20%，向上相反
    pub fn to_gesture(&self, rect: &WindowRect, duration_ms: u64) -> SwipeGesture {
        let x = (rect.x + rect.width / 2.0) as i64;
        let low = (rect.y + rect.height * 0.8) as i64;
        let high = (rect.y + rect.height * 0.2) as i64;

        let (start_y, end_y) = match self {
            ScrollDirection::Down => (low, high),
            ScrollDirection::Up => (high, low),
        };

        SwipeGesture {
            start_x: x,
            start_y,
            end_x: x,
            end_y,
            duration_ms,
        }
    }
}

/// 根据启动目标生成会话能力
pub fn build_capabilities(request: &SessionRequest, config: &CapabilityConfig) -> Capabilities {
    let mut caps = Capabilities::new();
    let platform = request.platform;

    caps.set("platformName", platform.as_str())
        .set("deviceName", request.device_name.as_str())
        .set("automationName", platform.automation_name());

    match platform {
        Platform::Ios => {
            caps.set("platformVersion", config.ios_platform_version.as_str());
        }
        Platform::Android => {
            caps.set("chromedriverAutodownload", config.chromedriver_autodownload);
        }
    }

    match &request.launch_target {
        LaunchTarget::AppPath { path } => {
            caps.set("app", path.as_str());
        }
        LaunchTarget::BundleId { bundle_id } => {
            caps.set("bundleId", bundle_id.as_str());
        }
        LaunchTarget::AndroidApp { package, activity } => {
            caps.set("appPackage", package.as_str())
                .set("appActivity", activity.as_str());
        }
        LaunchTarget::Browser => {
            caps.set("browserName", platform.default_browser());
            if platform == Platform::Ios {
                caps.set("safariAllowPopups", true)
                    .set("safariIgnoreFraudWarning", true);
            }
        }
    }

    caps.set("newCommandTimeout", config.new_command_timeout)
        .set("noReset", config.no_reset);

    for (name, value) in &config.extra {
        caps.set(name, value.clone());
    }

    caps
}
