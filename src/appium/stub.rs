//! 测试用的自动化客户端桩，记录每种操作的调用次数

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use super::types::{Capabilities, CreatedSession, Locator, RemoteError, SwipeGesture, WindowRect};
use super::AutomationClient;

#[derive(Default)]
pub struct StubClient {
    calls: Mutex<HashMap<&'static str, usize>>,
    /// 下一次对应操作返回的错误
    failures: Mutex<HashMap<&'static str, RemoteError>>,
    /// find 时返回 no such element 的定位值
    missing: Mutex<HashSet<String>>,
    session_counter: AtomicUsize,
    element_counter: AtomicUsize,
    hold_create: AtomicBool,
    pub create_entered: Notify,
    pub create_release: Notify,
    hold_find: AtomicBool,
    pub find_entered: Notify,
    pub find_release: Notify,
    hold_delete: AtomicBool,
    pub delete_entered: Notify,
    pub delete_release: Notify,
    pub last_capabilities: Mutex<Option<Capabilities>>,
    pub deleted: Mutex<Vec<String>>,
    pub clicked: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<(String, String)>>,
    pub swipes: Mutex<Vec<SwipeGesture>>,
    pub navigated: Mutex<Vec<String>>,
    pub page_source: Mutex<String>,
}

impl StubClient {
    pub fn new() -> Self {
        let stub = Self::default();
        *stub.page_source.lock().unwrap() = "<hierarchy><android.widget.Button/></hierarchy>".to_string();
        stub
    }

    /// 指定操作的调用次数
    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// 全部远程调用次数
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn fail_next(&self, op: &'static str, error: RemoteError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    pub fn mark_missing(&self, value: &str) {
        self.missing.lock().unwrap().insert(value.to_string());
    }

    /// create_session 挂起，直到 `create_release` 被通知
    pub fn hold_create(&self) {
        self.hold_create.store(true, Ordering::SeqCst);
    }

    /// find_element 挂起，直到 `find_release` 被通知
    pub fn hold_find(&self) {
        self.hold_find.store(true, Ordering::SeqCst);
    }

    /// delete_session 挂起，直到 `delete_release` 被通知
    pub fn hold_delete(&self) {
        self.hold_delete.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: &'static str) -> Result<(), RemoteError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.failures.lock().unwrap().remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AutomationClient for StubClient {
    async fn create_session(&self, capabilities: &Capabilities) -> Result<CreatedSession, RemoteError> {
        self.record("create_session")?;
        *self.last_capabilities.lock().unwrap() = Some(capabilities.clone());

        if self.hold_create.load(Ordering::SeqCst) {
            self.create_entered.notify_one();
            self.create_release.notified().await;
        }

        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedSession {
            session_id: format!("session-{}", n),
            capabilities: capabilities.as_map().clone(),
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), RemoteError> {
        self.record("delete_session")?;
        if self.hold_delete.load(Ordering::SeqCst) {
            self.delete_entered.notify_one();
            self.delete_release.notified().await;
        }
        self.deleted.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn find_element(&self, _session_id: &str, locator: &Locator) -> Result<String, RemoteError> {
        self.record("find_element")?;
        if self.hold_find.load(Ordering::SeqCst) {
            self.find_entered.notify_one();
            self.find_release.notified().await;
        }
        if self.missing.lock().unwrap().contains(&locator.value) {
            return Err(RemoteError::NoSuchElement(format!("{} not found", locator)));
        }
        let n = self.element_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ref-{}", n))
    }

    async fn click_element(&self, _session_id: &str, element_ref: &str) -> Result<(), RemoteError> {
        self.record("click_element")?;
        self.clicked.lock().unwrap().push(element_ref.to_string());
        Ok(())
    }

    async fn send_keys(&self, _session_id: &str, element_ref: &str, text: &str) -> Result<(), RemoteError> {
        self.record("send_keys")?;
        self.typed
            .lock()
            .unwrap()
            .push((element_ref.to_string(), text.to_string()));
        Ok(())
    }

    async fn page_source(&self, _session_id: &str) -> Result<String, RemoteError> {
        self.record("page_source")?;
        Ok(self.page_source.lock().unwrap().clone())
    }

    async fn window_rect(&self, _session_id: &str) -> Result<WindowRect, RemoteError> {
        self.record("window_rect")?;
        Ok(WindowRect {
            x: 0.0,
            y: 0.0,
            width: 400.0,
            height: 800.0,
        })
    }

    async fn swipe(&self, _session_id: &str, gesture: &SwipeGesture) -> Result<(), RemoteError> {
        self.record("swipe")?;
        self.swipes.lock().unwrap().push(*gesture);
        Ok(())
    }

    async fn element_text(&self, _session_id: &str, element_ref: &str) -> Result<String, RemoteError> {
        self.record("element_text")?;
        Ok(format!("text of {}", element_ref))
    }

    async fn navigate(&self, _session_id: &str, url: &str) -> Result<(), RemoteError> {
        self.record("navigate")?;
        self.navigated.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
