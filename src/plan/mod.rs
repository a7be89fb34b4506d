//! 计划模块
//!
//! 计划模型（Plan / Step 状态机）、依赖图、按复杂度等级组装计划的构建器，
//! 以及就绪集合调度的执行引擎。

pub mod builder;
pub mod engine;
pub mod graph;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{InvocationResult, ToolRegistry};

pub use builder::PlanBuilder;
pub use engine::{ExecutionEngine, ExecutionSummary, StepOutcome};
pub use graph::{BlockReason, PlanGraph};
pub use types::{Plan, PlanStatus, Step, StepId, StepStatus};

/// 执行引擎调用工具的入口
///
/// 失败以 InvocationResult 表示，不应 panic 或返回错误。
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, args: Value) -> InvocationResult;
}

/// 直接使用注册表（不设截止时间）
#[async_trait]
impl StepInvoker for ToolRegistry {
    async fn invoke(&self, tool: &str, args: Value) -> InvocationResult {
        ToolRegistry::invoke(self, tool, args).await
    }
}
