//! 会话状态机与元素句柄注册表
//!
//! 每个调度器实例持有一个 `SessionManager`，同一时间最多只有一个活动会话。

pub mod manager;
pub mod registry;
pub mod types;

pub use manager::{QuitOutcome, ResolvedElement, SessionError, SessionManager};
pub use registry::{ElementHandle, ElementRegistry};
pub use types::{
    build_capabilities, LaunchTarget, Platform, ScrollDirection, SessionInfo, SessionRequest,
    SessionState,
};
