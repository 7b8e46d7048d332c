//! 调用方命令循环
//!
//! 推理后端通过 `ToolPlanner` 接入，本模块不提供任何具体实现。

pub mod command_loop;
pub mod planner;
pub mod retry;

pub use command_loop::{CommandLoop, LoopConfig, LoopOutcome, LoopReport};
pub use planner::{PlannedStep, PlannerError, StepRecord, ToolCall, ToolPlanner};
pub use retry::{RetryConfig, RetryStrategy};
