//! 计划类型定义
//!
//! Plan 独占其 Step（按插入顺序存放，按 step_id 查找）；状态迁移只允许沿固定方向前进：
//! Step: Pending -> InProgress -> Completed | Failed
//! Plan: Created -> Ready -> Executing -> Completed | Failed

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{OrchestratorError, ToolErrorKind};

pub type StepId = u32;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 等待依赖满足
    Pending,
    /// 正在执行
    InProgress,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }
}

/// 计划状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// 已创建，步骤尚在组装
    Created,
    /// 组装完成，等待执行
    Ready,
    /// 正在执行
    Executing,
    /// 全部步骤完成
    Completed,
    /// 无法继续推进且存在未完成步骤
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }

    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (PlanStatus::Created, PlanStatus::Ready)
                | (PlanStatus::Ready, PlanStatus::Executing)
                | (PlanStatus::Executing, PlanStatus::Completed)
                | (PlanStatus::Executing, PlanStatus::Failed)
        )
    }
}

/// 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: StepId,
    pub description: String,
    /// 为空表示无需调用工具
    pub tool: Option<String>,
    /// 调用工具时传入的参数
    #[serde(default = "empty_args")]
    pub args: Value,
    pub dependencies: Vec<StepId>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    /// 因上游失败 / 缺失 / 成环而永远无法执行时的原因；状态保持 Pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Step {
    pub fn new(step_id: StepId, description: impl Into<String>) -> Self {
        Self {
            step_id,
            description: description.into(),
            tool: None,
            args: empty_args(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            error_kind: None,
            blocked_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_optional_tool(mut self, tool: Option<String>) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn depends_on(mut self, deps: Vec<StepId>) -> Self {
        self.dependencies = deps;
        self
    }

    fn transition(&mut self, next: StepStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                step_id = self.step_id,
                from = ?self.status,
                to = ?next,
                "illegal step transition ignored"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn mark_in_progress(&mut self) -> bool {
        if self.transition(StepStatus::InProgress) {
            self.started_at = Some(chrono::Utc::now().timestamp_millis());
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_completed(&mut self, result: Value) -> bool {
        let ok = self.transition(StepStatus::Completed);
        if ok {
            self.result = Some(result);
            self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        }
        ok
    }

    pub(crate) fn mark_failed(
        &mut self,
        error: impl Into<String>,
        kind: Option<ToolErrorKind>,
        result: Option<Value>,
    ) -> bool {
        let ok = self.transition(StepStatus::Failed);
        if ok {
            self.error = Some(error.into());
            self.error_kind = kind;
            self.result = result;
            self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        }
        ok
    }

    pub(crate) fn mark_blocked(&mut self, reason: impl Into<String>) {
        if self.status == StepStatus::Pending {
            self.blocked_reason = Some(reason.into());
        }
    }
}

/// 计划：一次任务对应的有序步骤集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub task: String,
    pub created_at: i64,
    pub status: PlanStatus,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            task: task.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            status: PlanStatus::Created,
            steps: Vec::new(),
        }
    }

    /// 追加步骤：拒绝重复 id 与自依赖；允许引用尚未添加的步骤（执行时若始终不存在则视为不可达）
    pub fn add_step(&mut self, step: Step) -> Result<(), OrchestratorError> {
        if self.status != PlanStatus::Created {
            return Err(OrchestratorError::InvalidPlan(format!(
                "cannot add step {} to a plan in status {:?}",
                step.step_id, self.status
            )));
        }
        if self.get_step(step.step_id).is_some() {
            return Err(OrchestratorError::InvalidPlan(format!(
                "duplicate step id {}",
                step.step_id
            )));
        }
        if step.dependencies.contains(&step.step_id) {
            return Err(OrchestratorError::InvalidPlan(format!(
                "step {} depends on itself",
                step.step_id
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn get_step(&self, step_id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn get_step_mut(&mut self, step_id: StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    pub fn set_status(&mut self, next: PlanStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(plan = %self.id, from = ?self.status, to = ?next, "illegal plan transition ignored");
            return false;
        }
        self.status = next;
        true
    }

    /// Created -> Ready
    pub fn mark_ready(&mut self) -> bool {
        self.set_status(PlanStatus::Ready)
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// 序列化快照（用于历史记录与对外返回）
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_transitions_are_one_way() {
        let mut step = Step::new(1, "do it");
        assert!(!step.mark_completed(Value::Null));
        assert_eq!(step.status, StepStatus::Pending);

        assert!(step.mark_in_progress());
        assert!(step.started_at.is_some());
        assert!(!step.mark_in_progress());

        assert!(step.mark_failed("boom", Some(ToolErrorKind::ExecutionFailed), None));
        assert_eq!(step.status, StepStatus::Failed);
        assert!(!step.mark_completed(Value::Null));
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_rejected_transition_keeps_timestamps() {
        let mut step = Step::new(1, "do it");
        assert!(!step.mark_failed("too early", None, None));
        assert!(step.completed_at.is_none());
        assert!(step.error.is_none());

        step.mark_in_progress();
        assert!(step.mark_completed(Value::from(1)));
        let finished = step.completed_at;
        assert!(finished.is_some());

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!step.mark_failed("late", None, None));
        assert!(!step.mark_completed(Value::from(2)));
        assert_eq!(step.completed_at, finished);
        assert_eq!(step.result, Some(Value::from(1)));
    }

    #[test]
    fn test_plan_status_order() {
        let mut plan = Plan::new("task");
        assert!(!plan.set_status(PlanStatus::Executing));
        assert!(plan.mark_ready());
        assert!(plan.set_status(PlanStatus::Executing));
        assert!(plan.set_status(PlanStatus::Completed));
        assert!(!plan.set_status(PlanStatus::Failed));
        assert!(plan.status.is_terminal());
    }

    #[test]
    fn test_add_step_rejects_duplicates_and_self_reference() {
        let mut plan = Plan::new("task");
        plan.add_step(Step::new(1, "a")).unwrap();
        assert!(matches!(
            plan.add_step(Step::new(1, "again")),
            Err(OrchestratorError::InvalidPlan(_))
        ));
        assert!(plan.add_step(Step::new(2, "self").depends_on(vec![2])).is_err());
        // 前向引用是允许的
        assert!(plan.add_step(Step::new(3, "forward").depends_on(vec![4])).is_ok());

        plan.mark_ready();
        assert!(plan.add_step(Step::new(5, "late")).is_err());
    }

    #[test]
    fn test_snapshot_uses_snake_case_status() {
        let mut plan = Plan::new("task");
        plan.add_step(Step::new(1, "a").with_tool("calculator")).unwrap();
        let snap = plan.snapshot();
        assert_eq!(snap["status"], "created");
        assert_eq!(snap["steps"][0]["status"], "pending");
        assert_eq!(snap["steps"][0]["tool"], "calculator");
    }
}
