//! 执行历史：追加式日志、聚合指标与 JSON 持久化

pub mod metrics;
pub mod persistence;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{ExecutionSummary, Plan, PlanStatus};

pub use metrics::{Insights, PerformanceMetrics, ToolUsageCount};
pub use persistence::HistoryPersistence;
pub use store::HistoryStore;

/// 一次任务执行的不可变记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: String,
    pub task: String,
    /// 计划快照
    pub plan: Value,
    pub result: ExecutionSummary,
    /// 当且仅当计划最终状态为 completed
    pub success: bool,
}

impl ExecutionRecord {
    pub fn new(plan: &Plan, summary: &ExecutionSummary) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            task: plan.task.clone(),
            plan: plan.snapshot(),
            result: summary.clone(),
            success: summary.plan_status == PlanStatus::Completed,
        }
    }
}
