use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::appium::{Locator, LocatorStrategy};

/// 元素句柄：调用方可见的 ID 到服务器元素引用的映射
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementHandle {
    pub handle_id: String,
    #[serde(skip)]
    pub server_ref: String,
    pub strategy: LocatorStrategy,
    pub locator_value: String,
    pub created_at: DateTime<Utc>,
}

/// 元素句柄注册表
///
/// 句柄 ID 在注册表的整个生命周期内单调递增，`clear` 不会重置计数器，
/// 因此旧会话的句柄永远不会解析到新会话的元素上。
#[derive(Debug, Default)]
pub struct ElementRegistry {
    handles: HashMap<String, ElementHandle>,
    next_id: u64,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为查找到的元素生成新句柄
    pub fn register(&mut self, server_ref: String, locator: &Locator) -> ElementHandle {
        self.next_id += 1;
        let handle = ElementHandle {
            handle_id: format!("h{}", self.next_id),
            server_ref,
            strategy: locator.strategy,
            locator_value: locator.value.clone(),
            created_at: Utc::now(),
        };

        debug!("注册元素句柄 {} -> {}", handle.handle_id, handle.server_ref);
        self.handles.insert(handle.handle_id.clone(), handle.clone());
        handle
    }

    /// 查找句柄
    pub fn resolve(&self, handle_id: &str) -> Option<&ElementHandle> {
        self.handles.get(handle_id)
    }

    /// 清空全部句柄，返回清除的数量
    pub fn clear(&mut self) -> usize {
        let count = self.handles.len();
        self.handles.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
