use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::planner::ToolCall;
use crate::tools::{ToolDispatcher, ToolResult};

/// 重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// 立即重试
    Immediate,

    /// 固定延迟重试
    FixedDelay { delay_ms: u64 },

    /// 指数退避重试
    ExponentialBackoff {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },

    /// 无重试
    None,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// 第 `attempt` 次失败后的等待时间，`None` 表示不再重试
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryStrategy::Immediate => Some(Duration::from_millis(0)),
            RetryStrategy::FixedDelay { delay_ms } => Some(Duration::from_millis(*delay_ms)),
            RetryStrategy::ExponentialBackoff {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let delay = (*initial_delay_ms as f64 * multiplier.powi(attempt as i32)) as u64;
                Some(Duration::from_millis(delay.min(*max_delay_ms)))
            }
            RetryStrategy::None => None,
        }
    }

    pub fn exponential(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self::ExponentialBackoff {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    pub fn fixed(delay_ms: u64) -> Self {
        Self::FixedDelay { delay_ms }
    }
}

/// 调用方的重试配置
///
/// 只有 `ErrorInfo.retryable` 为真的结果才会重试，调度器本身从不重试。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最多尝试次数（含第一次）
    pub max_attempts: u32,

    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, strategy: RetryStrategy) -> Self {
        Self {
            max_attempts,
            strategy,
        }
    }

    /// 只尝试一次
    pub fn disabled() -> Self {
        Self::new(1, RetryStrategy::None)
    }

    /// 执行操作，结果可重试时按策略等待后再试
    pub async fn execute<F, Fut>(&self, mut operation: F) -> ToolResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ToolResult>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = operation().await;
            attempt += 1;

            if result.ok {
                if attempt > 1 {
                    debug!("操作在第 {} 次尝试后成功", attempt);
                }
                return result;
            }

            if !result.is_retryable() {
                debug!("错误不可重试，放弃重试");
                return result;
            }

            if attempt >= max_attempts {
                warn!("已达到最大尝试次数 {}", max_attempts);
                return result;
            }

            match self.strategy.next_delay(attempt - 1) {
                Some(delay) => {
                    warn!(
                        "操作失败（第 {} 次尝试）: {:?}，{:?} 后重试",
                        attempt,
                        result.error_kind(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return result,
            }
        }
    }

    /// 带重试地调用一次工具
    pub async fn invoke(&self, dispatcher: &ToolDispatcher, call: &ToolCall) -> ToolResult {
        self.execute(move || dispatcher.invoke(&call.tool, call.arguments.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ErrorInfo, ErrorKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn failing(kind: ErrorKind) -> ToolResult {
        ToolResult::failure(ErrorInfo::new(kind, "failed"))
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = RetryStrategy::exponential(1000, 10000, 2.0);

        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(1000)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(2000)));
        assert_eq!(strategy.next_delay(3), Some(Duration::from_millis(8000)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(10000)));
        assert_eq!(RetryStrategy::fixed(200).next_delay(5), Some(Duration::from_millis(200)));
        assert_eq!(RetryStrategy::None.next_delay(0), None);
    }

    #[tokio::test]
    async fn test_retries_only_retryable_results() {
        let config = RetryConfig::new(3, RetryStrategy::Immediate);

        let attempts = Arc::new(AtomicU32::new(0));
        let result = config
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        failing(ErrorKind::ElementNotFound)
                    } else {
                        ToolResult::success(json!({ "element_id": "h1" }))
                    }
                }
            })
            .await;
        assert!(result.ok);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let attempts = Arc::new(AtomicU32::new(0));
        let result = config
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    failing(ErrorKind::InvalidHandle)
                }
            })
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidHandle));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let attempts = Arc::new(AtomicU32::new(0));
        let result = RetryConfig::new(4, RetryStrategy::fixed(1))
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    failing(ErrorKind::RemoteUnavailable)
                }
            })
            .await;
        assert!(result.is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let attempts = Arc::new(AtomicU32::new(0));
        RetryConfig::disabled()
            .execute(|| {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    failing(ErrorKind::RemoteUnavailable)
                }
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
