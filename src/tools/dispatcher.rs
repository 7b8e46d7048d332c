use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::result::{ErrorInfo, ErrorKind, ToolResult};
use super::schema::{
    parse_args, tool_definitions, ArgumentError, ElementArgs, FindElementArgs, InputTarget,
    InputTextArgs, PageSourceArgs, ScrollArgs, StartSessionArgs, ToolDefinition, ToolName,
};
use crate::appium::AutomationClient;
use crate::config::{CapabilityConfig, ToolConfig};
use crate::session::{
    build_capabilities, LaunchTarget, Platform, QuitOutcome, SessionError, SessionInfo,
    SessionManager, SessionRequest,
};

/// 页面源码截断标记
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

impl From<ArgumentError> for ErrorInfo {
    fn from(error: ArgumentError) -> Self {
        ErrorInfo::new(ErrorKind::InvalidArguments, error.to_string())
    }
}

/// 工具内部错误：参数错误或会话层错误
enum ToolError {
    Arguments(ArgumentError),
    Session(SessionError),
    /// 已补充上下文的错误
    Detailed(ErrorInfo),
}

impl From<ArgumentError> for ToolError {
    fn from(error: ArgumentError) -> Self {
        ToolError::Arguments(error)
    }
}

impl From<SessionError> for ToolError {
    fn from(error: SessionError) -> Self {
        ToolError::Session(error)
    }
}

impl From<ToolError> for ErrorInfo {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::Arguments(e) => e.into(),
            ToolError::Session(e) => e.into(),
            ToolError::Detailed(info) => info,
        }
    }
}

type ToolOutcome = Result<Value, ToolError>;

/// 工具调度器：所有工具调用的唯一入口
///
/// 调度器自身不保存状态，会话与元素句柄全部由 `SessionManager` 持有。
/// 远程调用失败不会在这里重试。
pub struct ToolDispatcher {
    session: SessionManager,
    tools: ToolConfig,
}

impl ToolDispatcher {
    pub fn new(
        client: Arc<dyn AutomationClient>,
        capabilities: CapabilityConfig,
        tools: ToolConfig,
    ) -> Self {
        Self {
            session: SessionManager::new(client, capabilities),
            tools,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    /// 各平台的会话能力模板，设备名与应用路径为占位值
    pub fn capability_templates(&self) -> Value {
        let mut templates = serde_json::Map::new();
        for platform in [Platform::Ios, Platform::Android] {
            let request = SessionRequest {
                platform,
                device_name: "<device_name>".to_string(),
                launch_target: LaunchTarget::AppPath {
                    path: "<app_path>".to_string(),
                },
                start_url: None,
            };
            let capabilities = build_capabilities(&request, self.session.capability_config());
            templates.insert(
                platform.as_str().to_string(),
                Value::Object(capabilities.as_map().clone()),
            );
        }
        Value::Object(templates)
    }

    pub async fn session_info(&self) -> SessionInfo {
        self.session.info().await
    }

    /// 进程退出前结束会话
    pub async fn shutdown(&self) -> QuitOutcome {
        self.session.quit().await
    }

    /// 调用工具，任何失败都转换为 `ToolResult`
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> ToolResult {
        let tool = match tool_name.parse::<ToolName>() {
            Ok(tool) => tool,
            Err(e) => {
                warn!("拒绝调用: {}", e);
                return ToolResult::failure(e.into());
            }
        };

        let span = tracing::info_span!("tool", name = %tool);
        async move {
            debug!("参数: {}", arguments);
            let outcome = match tool {
                ToolName::StartSession => self.start_session(arguments).await,
                ToolName::GetSessionInfo => self.get_session_info().await,
                ToolName::QuitSession => self.quit_session().await,
                ToolName::FindElement => self.find_element(arguments).await,
                ToolName::TapElement => self.tap_element(arguments).await,
                ToolName::InputText => self.input_text(arguments).await,
                ToolName::GetText => self.get_text(arguments).await,
                ToolName::GetPageSource => self.get_page_source(arguments).await,
                ToolName::Scroll => self.scroll(arguments).await,
            };

            match outcome {
                Ok(payload) => ToolResult::success(payload),
                Err(e) => {
                    let info = ErrorInfo::from(e);
                    info!("调用失败 [{}]: {}", info.kind, info.message);
                    ToolResult::failure(info)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn start_session(&self, arguments: Value) -> ToolOutcome {
        let request = parse_args::<StartSessionArgs>(arguments)?.into_request()?;
        let capabilities = build_capabilities(&request, self.session.capability_config());
        let info = self.session.start(request.clone()).await?;

        let mut payload = json!({
            "message": format!("Session started on {} ({})", request.device_name, request.platform),
            "session_id": info.session_id,
            "platform": request.platform,
            "device_name": request.device_name,
            "automation_name": info.automation_name,
            "launch_target": request.launch_target,
            "capabilities": capabilities.as_map(),
        });

        if let Some(url) = &request.start_url {
            match self.session.navigate(url).await {
                Ok(()) => payload["start_url"] = json!(url),
                Err(e) => {
                    warn!("打开起始页面失败（会话保持）: {}", e);
                    payload["navigation_error"] = json!(e.to_string());
                }
            }
        }

        Ok(payload)
    }

    async fn get_session_info(&self) -> ToolOutcome {
        let info = self.session.info().await;
        Ok(serde_json::to_value(&info).unwrap_or_else(|_| json!({ "state": info.state })))
    }

    async fn quit_session(&self) -> ToolOutcome {
        let payload = match self.session.quit().await {
            QuitOutcome::NoSession => json!({
                "message": "No active session",
                "terminated_session_id": null,
            }),
            QuitOutcome::Terminated {
                session_id,
                released_handles,
            } => json!({
                "message": "Session terminated",
                "terminated_session_id": session_id,
                "released_handles": released_handles,
            }),
        };
        Ok(payload)
    }

    async fn find_element(&self, arguments: Value) -> ToolOutcome {
        let locator = parse_args::<FindElementArgs>(arguments)?.into_locator()?;
        let handle = self.session.find_element(locator).await?;
        Ok(json!({
            "element_id": handle.handle_id,
            "strategy": handle.strategy,
            "value": handle.locator_value,
        }))
    }

    async fn tap_element(&self, arguments: Value) -> ToolOutcome {
        let element_id = parse_args::<ElementArgs>(arguments)?.validate()?;
        self.session.click(&element_id).await?;
        Ok(json!({
            "message": format!("Tapped element {}", element_id),
            "element_id": element_id,
        }))
    }

    async fn input_text(&self, arguments: Value) -> ToolOutcome {
        let (target, text) = parse_args::<InputTextArgs>(arguments)?.into_target()?;
        let element_id = match target {
            InputTarget::Handle(element_id) => {
                self.session.send_keys(&element_id, &text).await?;
                element_id
            }
            InputTarget::Locate(locator) => {
                let element_id = self.session.find_element(locator).await?.handle_id;
                // 句柄已注册，失败时告知调用方以便复用
                if let Err(e) = self.session.send_keys(&element_id, &text).await {
                    let mut info = ErrorInfo::from(e);
                    info.message = format!("{} (element_id: {})", info.message, element_id);
                    return Err(ToolError::Detailed(info));
                }
                element_id
            }
        };

        Ok(json!({
            "message": format!("Sent text to element {}", element_id),
            "element_id": element_id,
        }))
    }

    async fn get_text(&self, arguments: Value) -> ToolOutcome {
        let element_id = parse_args::<ElementArgs>(arguments)?.validate()?;
        let text = self.session.element_text(&element_id).await?;
        Ok(json!({
            "element_id": element_id,
            "text": text,
        }))
    }

    async fn get_page_source(&self, arguments: Value) -> ToolOutcome {
        let args = parse_args::<PageSourceArgs>(arguments)?;
        let source = self.session.page_source().await?;
        let length = source.chars().count();

        let (page_source, truncated) = if !args.full && length > self.tools.page_source_max_len {
            let mut head: String = source.chars().take(self.tools.page_source_max_len).collect();
            head.push_str(TRUNCATION_MARKER);
            (head, true)
        } else {
            (source, false)
        };

        Ok(json!({
            "page_source": page_source,
            "length": length,
            "truncated": truncated,
        }))
    }

    async fn scroll(&self, arguments: Value) -> ToolOutcome {
        let args = parse_args::<ScrollArgs>(arguments)?;
        let gesture = self
            .session
            .scroll(args.direction, self.tools.scroll_duration_ms)
            .await?;
        Ok(json!({
            "message": format!("Scrolled {}", args.direction.as_str()),
            "direction": args.direction,
            "from": [gesture.start_x, gesture.start_y],
            "to": [gesture.end_x, gesture.end_y],
        }))
    }
}
