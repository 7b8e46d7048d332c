use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::registry::{ElementHandle, ElementRegistry};
use super::types::{
    build_capabilities, ScrollDirection, SessionInfo, SessionRequest, SessionState,
};
use crate::appium::{AutomationClient, Locator, RemoteError, SwipeGesture};
use crate::config::CapabilityConfig;

/// 会话层错误
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("没有活动会话，请先调用 start_session")]
    NoActiveSession,

    #[error("会话启动失败: {0}")]
    StartFailed(String),

    #[error("未找到元素 {locator}: {message}")]
    ElementNotFound { locator: String, message: String },

    #[error("无效的元素句柄: {0}，请重新查找元素")]
    InvalidHandle(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// quit 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitOutcome {
    /// 本来就没有会话
    NoSession,
    /// 会话已结束
    Terminated {
        session_id: Option<String>,
        released_handles: usize,
    },
}

/// 已解析的元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    pub session_id: String,
    pub server_ref: String,
}

struct ActiveSession {
    id: Option<String>,
    request: SessionRequest,
    automation_name: Option<String>,
    started_at: DateTime<Utc>,
}

/// 单个会话的全部可变状态，由一把锁保护
struct SessionContext {
    state: SessionState,
    /// 每次状态迁移递增，用于识别远程调用期间会话是否已被替换
    epoch: u64,
    session: Option<ActiveSession>,
    registry: ElementRegistry,
}

impl SessionContext {
    fn new() -> Self {
        Self {
            state: SessionState::None,
            epoch: 0,
            session: None,
            registry: ElementRegistry::new(),
        }
    }

    /// 回到 None 状态并清空句柄
    fn reset(&mut self) -> usize {
        self.state = SessionState::None;
        self.session = None;
        self.epoch += 1;
        self.registry.clear()
    }

    fn active_id(&self) -> Result<String, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NoActiveSession);
        }
        self.session
            .as_ref()
            .and_then(|s| s.id.clone())
            .ok_or(SessionError::NoActiveSession)
    }

    fn snapshot(&self) -> SessionInfo {
        match &self.session {
            Some(session) => SessionInfo {
                state: self.state,
                session_id: session.id.clone(),
                platform: Some(session.request.platform),
                device_name: Some(session.request.device_name.clone()),
                automation_name: session.automation_name.clone(),
                launch_target: Some(session.request.launch_target.clone()),
                started_at: Some(session.started_at),
                element_count: self.registry.len(),
            },
            None => SessionInfo {
                state: self.state,
                ..SessionInfo::none()
            },
        }
    }
}

/// 会话状态机：None → Starting → Active → Terminating → None
///
/// 锁只在状态迁移和句柄读写时持有，远程调用期间不持锁，
/// 因此 quit 随时可以执行。
pub struct SessionManager {
    client: Arc<dyn AutomationClient>,
    capabilities: CapabilityConfig,
    context: Mutex<SessionContext>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn AutomationClient>, capabilities: CapabilityConfig) -> Self {
        Self {
            client,
            capabilities,
            context: Mutex::new(SessionContext::new()),
        }
    }

    pub fn capability_config(&self) -> &CapabilityConfig {
        &self.capabilities
    }

    /// 启动会话，仅允许在 None 状态下调用
    pub async fn start(&self, request: SessionRequest) -> Result<SessionInfo, SessionError> {
        let epoch = {
            let mut ctx = self.context.lock().await;
            if ctx.state != SessionState::None {
                return Err(SessionError::StartFailed(format!(
                    "已有会话处于 {} 状态，请先调用 quit_session",
                    ctx.state
                )));
            }

            ctx.epoch += 1;
            ctx.state = SessionState::Starting;
            ctx.session = Some(ActiveSession {
                id: None,
                request: request.clone(),
                automation_name: None,
                started_at: Utc::now(),
            });
            ctx.epoch
        };

        info!(
            "启动会话: 平台={} 设备={} 目标={}",
            request.platform,
            request.device_name,
            request.launch_target.describe()
        );

        let capabilities = build_capabilities(&request, &self.capabilities);
        debug!("会话能力: {:?}", capabilities.as_map());

        let result = self.client.create_session(&capabilities).await;
        let mut ctx = self.context.lock().await;

        match result {
            Ok(created) => {
                if ctx.epoch != epoch || ctx.state != SessionState::Starting {
                    drop(ctx);
                    warn!("会话 {} 在启动过程中被终止，删除远程会话", created.session_id);
                    if let Err(e) = self.client.delete_session(&created.session_id).await {
                        warn!("删除远程会话 {} 失败（忽略）: {}", created.session_id, e);
                    }
                    return Err(SessionError::StartFailed(
                        "会话在启动过程中被终止".to_string(),
                    ));
                }

                let automation_name = created
                    .capabilities
                    .get("automationName")
                    .or_else(|| created.capabilities.get("appium:automationName"))
                    .and_then(Value::as_str)
                    .unwrap_or(request.platform.automation_name())
                    .to_string();

                if let Some(session) = ctx.session.as_mut() {
                    session.id = Some(created.session_id.clone());
                    session.automation_name = Some(automation_name);
                }
                ctx.state = SessionState::Active;

                info!("会话已启动: {}", created.session_id);
                Ok(ctx.snapshot())
            }
            Err(e) => {
                if ctx.epoch == epoch {
                    ctx.reset();
                }
                warn!("会话启动失败: {}", e);
                Err(SessionError::StartFailed(e.to_string()))
            }
        }
    }

    /// 当前会话快照，任何状态下都可调用
    pub async fn info(&self) -> SessionInfo {
        self.context.lock().await.snapshot()
    }

    pub async fn state(&self) -> SessionState {
        self.context.lock().await.state
    }

    /// 结束会话：远程删除尽力而为，本地状态无条件复位
    pub async fn quit(&self) -> QuitOutcome {
        let (session_id, released_handles, epoch) = {
            let mut ctx = self.context.lock().await;
            match ctx.state {
                SessionState::None => {
                    debug!("quit: 当前没有会话");
                    return QuitOutcome::NoSession;
                }
                SessionState::Terminating => {
                    // 另一个 quit 仍在等待远程删除，这里直接完成本地复位
                    let released_handles = ctx.reset();
                    return QuitOutcome::Terminated {
                        session_id: None,
                        released_handles,
                    };
                }
                SessionState::Starting | SessionState::Active => {}
            }

            let session_id = ctx.session.take().and_then(|s| s.id);
            let released_handles = ctx.registry.clear();
            ctx.state = SessionState::Terminating;
            ctx.epoch += 1;
            (session_id, released_handles, ctx.epoch)
        };

        match &session_id {
            Some(id) => {
                info!("结束会话: {}（释放 {} 个元素句柄）", id, released_handles);
                if let Err(e) = self.client.delete_session(id).await {
                    warn!("删除远程会话 {} 失败（忽略）: {}", id, e);
                }
            }
            None => info!("取消正在启动的会话"),
        }

        let mut ctx = self.context.lock().await;
        if ctx.epoch == epoch {
            ctx.reset();
        }

        QuitOutcome::Terminated {
            session_id,
            released_handles,
        }
    }

    async fn active_session(&self) -> Result<(String, u64), SessionError> {
        let ctx = self.context.lock().await;
        let id = ctx.active_id()?;
        Ok((id, ctx.epoch))
    }

    /// 查找元素并注册句柄，失败时不注册任何句柄
    pub async fn find_element(&self, locator: Locator) -> Result<ElementHandle, SessionError> {
        let (session_id, epoch) = self.active_session().await?;

        let server_ref = match self.client.find_element(&session_id, &locator).await {
            Ok(server_ref) => server_ref,
            Err(RemoteError::NoSuchElement(message)) => {
                debug!("未找到元素 {}: {}", locator, message);
                return Err(SessionError::ElementNotFound {
                    locator: locator.to_string(),
                    message,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut ctx = self.context.lock().await;
        if ctx.epoch != epoch || ctx.state != SessionState::Active {
            warn!("会话在查找元素期间已结束，丢弃元素引用 {}", server_ref);
            return Err(SessionError::NoActiveSession);
        }

        Ok(ctx.registry.register(server_ref, &locator))
    }

    /// 解析句柄：先检查会话状态，再检查句柄
    pub async fn resolve(&self, handle_id: &str) -> Result<ResolvedElement, SessionError> {
        let ctx = self.context.lock().await;
        let session_id = ctx.active_id()?;
        let handle = ctx
            .registry
            .resolve(handle_id)
            .ok_or_else(|| SessionError::InvalidHandle(handle_id.to_string()))?;

        Ok(ResolvedElement {
            session_id,
            server_ref: handle.server_ref.clone(),
        })
    }

    pub async fn click(&self, handle_id: &str) -> Result<(), SessionError> {
        let element = self.resolve(handle_id).await?;
        self.client
            .click_element(&element.session_id, &element.server_ref)
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, handle_id: &str, text: &str) -> Result<(), SessionError> {
        let element = self.resolve(handle_id).await?;
        self.client
            .send_keys(&element.session_id, &element.server_ref, text)
            .await?;
        Ok(())
    }

    pub async fn element_text(&self, handle_id: &str) -> Result<String, SessionError> {
        let element = self.resolve(handle_id).await?;
        Ok(self
            .client
            .element_text(&element.session_id, &element.server_ref)
            .await?)
    }

    pub async fn page_source(&self) -> Result<String, SessionError> {
        let (session_id, _) = self.active_session().await?;
        Ok(self.client.page_source(&session_id).await?)
    }

    /// 按方向滚动，返回实际执行的手势
    pub async fn scroll(
        &self,
        direction: ScrollDirection,
        duration_ms: u64,
    ) -> Result<SwipeGesture, SessionError> {
        let (session_id, _) = self.active_session().await?;
        let rect = self.client.window_rect(&session_id).await?;
        let gesture = direction.to_gesture(&rect, duration_ms);
        self.client.swipe(&session_id, &gesture).await?;
        Ok(gesture)
    }

    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let (session_id, _) = self.active_session().await?;
        info!("浏览器跳转: {}", url);
        Ok(self.client.navigate(&session_id, url).await?)
    }
}
