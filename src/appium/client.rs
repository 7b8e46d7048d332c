use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::protocol::{
    decode_element_ref, decode_new_session, decode_string, decode_unit, decode_window_rect,
    parse_envelope, Envelope,
};
use super::types::{Capabilities, CreatedSession, Locator, RemoteError, SwipeGesture, WindowRect};
use super::AutomationClient;
use crate::config::ServerConfig;

/// 基于 reqwest 的 Appium 客户端
pub struct AppiumClient {
    client: Client,
    base_url: String,
    command_timeout: Duration,
    session_start_timeout: Duration,
}

impl AppiumClient {
    /// 根据服务器配置创建客户端
    pub fn new(config: &ServerConfig) -> Result<Self, RemoteError> {
        Self::with_timeouts(
            &config.url,
            Duration::from_secs(config.command_timeout_secs),
            Duration::from_secs(config.session_start_timeout_secs),
        )
    }

    pub fn with_timeouts(
        base_url: &str,
        command_timeout: Duration,
        session_start_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(command_timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            command_timeout,
            session_start_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 发送请求并解析响应信封
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Envelope, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Appium 请求: {} {}", method, url);

        let mut request = self.client.request(method.clone(), &url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(format!("{} {} 超过 {:?}", method, url, timeout))
            } else {
                RemoteError::Unavailable(format!("{} {} 请求失败: {}", method, url, e))
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(format!("{} {} 读取响应超时", method, url))
            } else {
                RemoteError::Unavailable(format!("{} {} 读取响应失败: {}", method, url, e))
            }
        })?;

        debug!("Appium 响应: {} {} -> {} ({} 字节)", method, url, status, text.len());
        parse_envelope(status, &text)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RemoteError> {
        self.execute(method, path, body, self.command_timeout)
            .await
            .map(|envelope| envelope.value)
    }
}

#[async_trait]
impl AutomationClient for AppiumClient {
    async fn create_session(&self, capabilities: &Capabilities) -> Result<CreatedSession, RemoteError> {
        info!("创建 Appium 会话: {}", self.base_url);
        let envelope = self
            .execute(
                Method::POST,
                "/session",
                Some(capabilities.to_new_session_payload()),
                self.session_start_timeout,
            )
            .await?;
        decode_new_session(envelope)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        let value = self
            .command(Method::DELETE, &format!("/session/{}", session_id), None)
            .await?;
        decode_unit(value)
    }

    async fn find_element(&self, session_id: &str, locator: &Locator) -> Result<String, RemoteError> {
        let body = serde_json::json!({
            "using": locator.strategy.as_webdriver_using(),
            "value": locator.value,
        });
        let value = self
            .command(Method::POST, &format!("/session/{}/element", session_id), Some(body))
            .await?;
        decode_element_ref(value)
    }

    async fn click_element(&self, session_id: &str, element_ref: &str) -> Result<(), RemoteError> {
        let value = self
            .command(
                Method::POST,
                &format!("/session/{}/element/{}/click", session_id, element_ref),
                Some(serde_json::json!({})),
            )
            .await?;
        decode_unit(value)
    }

    async fn send_keys(&self, session_id: &str, element_ref: &str, text: &str) -> Result<(), RemoteError> {
        // 同时携带 W3C 的 text 与 JSONWP 的 value 字段
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let body = serde_json::json!({ "text": text, "value": chars });
        let value = self
            .command(
                Method::POST,
                &format!("/session/{}/element/{}/value", session_id, element_ref),
                Some(body),
            )
            .await?;
        decode_unit(value)
    }

    async fn page_source(&self, session_id: &str) -> Result<String, RemoteError> {
        let value = self
            .command(Method::GET, &format!("/session/{}/source", session_id), None)
            .await?;
        decode_string(value)
    }

    async fn window_rect(&self, session_id: &str) -> Result<WindowRect, RemoteError> {
        let value = self
            .command(Method::GET, &format!("/session/{}/window/rect", session_id), None)
            .await?;
        decode_window_rect(value)
    }

    async fn swipe(&self, session_id: &str, gesture: &SwipeGesture) -> Result<(), RemoteError> {
        debug!("执行滑动: {:?}", gesture);
        let value = self
            .command(
                Method::POST,
                &format!("/session/{}/actions", session_id),
                Some(gesture.to_actions_payload()),
            )
            .await?;
        decode_unit(value)
    }

    async fn element_text(&self, session_id: &str, element_ref: &str) -> Result<String, RemoteError> {
        let value = self
            .command(
                Method::GET,
                &format!("/session/{}/element/{}/text", session_id, element_ref),
                None,
            )
            .await?;
        decode_string(value)
    }

    async fn navigate(&self, session_id: &str, url: &str) -> Result<(), RemoteError> {
        let value = self
            .command(
                Method::POST,
                &format!("/session/{}/url", session_id),
                Some(serde_json::json!({ "url": url })),
            )
            .await?;
        decode_unit(value)
    }
}
