use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::planner::{PlannedStep, StepRecord, ToolPlanner};
use super::retry::RetryConfig;
use crate::tools::ToolDispatcher;

/// 命令循环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// 最大步数
    pub max_steps: usize,

    /// 连续失败多少次后停止
    pub max_consecutive_failures: usize,

    pub retry: RetryConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            max_consecutive_failures: 3,
            retry: RetryConfig::default(),
        }
    }
}

/// 循环结束原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    Finished { summary: String },
    StepLimit { steps: usize },
    TooManyFailures { failures: usize },
    PlannerFailed { message: String },
}

impl LoopOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, LoopOutcome::Finished { .. })
    }
}

/// 一条指令的执行报告
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub run_id: String,
    pub instruction: String,
    pub outcome: LoopOutcome,
    pub history: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// 驱动一条自然语言指令：询问规划器、调用工具、记录结果
pub struct CommandLoop {
    dispatcher: Arc<ToolDispatcher>,
    planner: Arc<dyn ToolPlanner>,
    config: LoopConfig,
}

impl CommandLoop {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        planner: Arc<dyn ToolPlanner>,
        config: LoopConfig,
    ) -> Self {
        Self {
            dispatcher,
            planner,
            config,
        }
    }

    pub async fn run(&self, instruction: &str) -> LoopReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("[{}] 开始执行指令: {}", run_id, instruction);

        let mut history: Vec<StepRecord> = Vec::new();
        let mut consecutive_failures = 0;

        let outcome = loop {
            if history.len() >= self.config.max_steps {
                warn!("[{}] 超过最大步数限制: {}", run_id, self.config.max_steps);
                break LoopOutcome::StepLimit {
                    steps: history.len(),
                };
            }

            if consecutive_failures >= self.config.max_consecutive_failures {
                warn!("[{}] 连续 {} 次调用失败，停止执行", run_id, consecutive_failures);
                break LoopOutcome::TooManyFailures {
                    failures: consecutive_failures,
                };
            }

            let call = match self.planner.next_step(instruction, &history).await {
                Ok(PlannedStep::Call(call)) => call,
                Ok(PlannedStep::Finish { summary }) => {
                    info!("[{}] 指令完成: {}", run_id, summary);
                    break LoopOutcome::Finished { summary };
                }
                Err(e) => {
                    warn!("[{}] {}", run_id, e);
                    break LoopOutcome::PlannerFailed {
                        message: e.to_string(),
                    };
                }
            };

            let step = history.len() + 1;
            debug!("[{}] 步骤 {}: {}", run_id, step, call.tool);
            let result = self.config.retry.invoke(&self.dispatcher, &call).await;

            if result.ok {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }

            history.push(StepRecord {
                step,
                call,
                result,
                timestamp: Utc::now(),
            });
        };

        LoopReport {
            run_id,
            instruction: instruction.to_string(),
            outcome,
            history,
            started_at,
            duration_ms: (Utc::now() - started_at).num_milliseconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::planner::{PlannerError, ToolCall};
    use crate::agent::retry::RetryStrategy;
    use crate::appium::stub::StubClient;
    use crate::config::{CapabilityConfig, ToolConfig};
    use crate::tools::ErrorKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预设步骤
    struct ScriptedPlanner {
        steps: Mutex<VecDeque<PlannedStep>>,
    }

    impl ScriptedPlanner {
        fn new(steps: Vec<PlannedStep>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
            })
        }
    }

    #[async_trait]
    impl ToolPlanner for ScriptedPlanner {
        async fn next_step(
            &self,
            _instruction: &str,
            _history: &[StepRecord],
        ) -> Result<PlannedStep, PlannerError> {
            self.steps
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PlannerError::Unavailable("脚本已用完".to_string()))
        }
    }

    fn call(tool: &str, arguments: serde_json::Value) -> PlannedStep {
        PlannedStep::Call(ToolCall::new(tool, arguments))
    }

    fn setup(config: LoopConfig, steps: Vec<PlannedStep>) -> (Arc<StubClient>, CommandLoop) {
        let stub = Arc::new(StubClient::new());
        let dispatcher = Arc::new(ToolDispatcher::new(
            stub.clone(),
            CapabilityConfig::default(),
            ToolConfig::default(),
        ));
        let command_loop = CommandLoop::new(dispatcher, ScriptedPlanner::new(steps), config);
        (stub, command_loop)
    }

    fn quick_config() -> LoopConfig {
        LoopConfig {
            retry: RetryConfig::new(2, RetryStrategy::Immediate),
            ..LoopConfig::default()
        }
    }

    #[tokio::test]
    async fn test_runs_until_finish() {
        let (stub, command_loop) = setup(
            quick_config(),
            vec![
                call("start_session", json!({ "platform": "android", "device_name": "Pixel", "app_package": "com.example", "app_activity": ".Main" })),
                call("find_element", json!({ "strategy": "id", "value": "login_button" })),
                call("tap_element", json!({ "element_id": "h1" })),
                PlannedStep::Finish { summary: "logged in".to_string() },
            ],
        );

        let report = command_loop.run("log in").await;
        assert_eq!(report.outcome, LoopOutcome::Finished { summary: "logged in".to_string() });
        assert_eq!(report.history.len(), 3);
        assert!(report.history.iter().all(|r| r.result.ok));
        assert_eq!(report.history[2].step, 3);
        assert_eq!(stub.count("click_element"), 1);
        assert!(!report.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_stops_after_consecutive_failures() {
        let (stub, command_loop) = setup(
            quick_config(),
            vec![
                call("tap_element", json!({ "element_id": "h1" })),
                call("scroll", json!({})),
                call("get_page_source", json!({})),
                call("quit_session", json!({})),
            ],
        );

        let report = command_loop.run("scroll around").await;
        assert_eq!(report.outcome, LoopOutcome::TooManyFailures { failures: 3 });
        assert_eq!(report.history.len(), 3);
        assert_eq!(report.history[0].result.error_kind(), Some(ErrorKind::NoActiveSession));
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_retryable_steps_and_respects_step_limit() {
        let config = LoopConfig {
            max_steps: 2,
            ..quick_config()
        };
        let (stub, command_loop) = setup(
            config,
            vec![
                call("start_session", json!({ "platform": "iOS", "device_name": "iPhone" })),
                call("find_element", json!({ "strategy": "id", "value": "spinner" })),
                call("get_session_info", json!({})),
            ],
        );
        stub.mark_missing("spinner");

        let report = command_loop.run("wait for spinner").await;
        assert_eq!(report.outcome, LoopOutcome::StepLimit { steps: 2 });
        assert_eq!(report.history[1].result.error_kind(), Some(ErrorKind::ElementNotFound));
        assert_eq!(stub.count("find_element"), 2);
    }

    #[tokio::test]
    async fn test_planner_failure_ends_loop() {
        let (_, command_loop) = setup(quick_config(), vec![]);
        let report = command_loop.run("anything").await;
        assert!(matches!(report.outcome, LoopOutcome::PlannerFailed { .. }));
        assert!(!report.outcome.is_finished());
        assert!(report.history.is_empty());
    }
}
