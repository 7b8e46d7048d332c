//! 远程自动化客户端
//!
//! 对 Appium 服务器（W3C WebDriver 协议）的薄封装，每个远程操作对应一个方法。
//! 客户端只负责请求和分类错误，不做任何重试。

pub mod client;
pub mod protocol;
pub mod types;

#[cfg(test)]
pub(crate) mod stub;

pub use client::AppiumClient;
pub use types::{
    Capabilities, CreatedSession, Locator, LocatorStrategy, RemoteError, SwipeGesture, WindowRect,
};

use async_trait::async_trait;

/// 远程自动化服务器接口
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// 创建会话
    async fn create_session(&self, capabilities: &Capabilities) -> Result<CreatedSession, RemoteError>;

    /// 删除会话
    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError>;

    /// 查找元素，返回服务器端元素引用
    async fn find_element(&self, session_id: &str, locator: &Locator) -> Result<String, RemoteError>;

    /// 点击元素
    async fn click_element(&self, session_id: &str, element_ref: &str) -> Result<(), RemoteError>;

    /// 向元素输入文本
    async fn send_keys(&self, session_id: &str, element_ref: &str, text: &str) -> Result<(), RemoteError>;

    /// 获取页面源码
    async fn page_source(&self, session_id: &str) -> Result<String, RemoteError>;

    /// 获取窗口尺寸
    async fn window_rect(&self, session_id: &str) -> Result<WindowRect, RemoteError>;

    /// 执行滑动手势
    async fn swipe(&self, session_id: &str, gesture: &SwipeGesture) -> Result<(), RemoteError>;

    /// 获取元素可见文本
    async fn element_text(&self, session_id: &str, element_ref: &str) -> Result<String, RemoteError>;

    /// 浏览器会话跳转到指定 URL
    async fn navigate(&self, session_id: &str, url: &str) -> Result<(), RemoteError>;
}
