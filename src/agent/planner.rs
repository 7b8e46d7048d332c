use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResult;

/// 一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// 规划器给出的下一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannedStep {
    Call(ToolCall),
    Finish { summary: String },
}

/// 已执行的一步
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub call: ToolCall,
    pub result: ToolResult,
    pub timestamp: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("规划器不可用: {0}")]
    Unavailable(String),

    #[error("规划器输出无法解析: {0}")]
    InvalidOutput(String),
}

/// 推理后端：根据指令和历史结果决定下一次工具调用
#[async_trait]
pub trait ToolPlanner: Send + Sync {
    async fn next_step(
        &self,
        instruction: &str,
        history: &[StepRecord],
    ) -> Result<PlannedStep, PlannerError>;
}
