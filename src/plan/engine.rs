//! 执行引擎
//!
//! 就绪集合调度：
//! 1. 计划进入 Executing
//! 2. 计算就绪集合（Pending 且依赖全部 Completed，按 ID 升序）
//! 3. 就绪集合为空时：全部完成则 Completed，否则 Failed，结束
//! 4. 执行整个就绪集合后回到 2
//!
//! 每轮至少把一个 Pending 步骤推进到终态，因此 N 个步骤最多 N 轮，成环的依赖也不会死循环。
//! 单步失败只会变成该步骤的 Failed 状态和错误信息，不会中断循环。

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::ToolErrorKind;
use crate::plan::graph::PlanGraph;
use crate::plan::types::{Plan, PlanStatus, StepId, StepStatus};
use crate::plan::StepInvoker;
use crate::tools::InvocationResult;

/// 单个步骤的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub tool: Option<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl StepOutcome {
    /// 步骤是否真正调用过工具（有工具且已到达终态）
    pub fn invoked_tool(&self) -> Option<&str> {
        match self.status {
            StepStatus::Completed | StepStatus::Failed => self.tool.as_deref(),
            _ => None,
        }
    }
}

/// 执行摘要：返回给调用方，也是历史记录的存储单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub plan_id: String,
    pub plan_status: PlanStatus,
    pub steps_completed: usize,
    pub steps_failed: usize,
    /// 因上游失败 / 缺失依赖 / 成环而永远无法执行的步骤数
    pub steps_blocked: usize,
    pub iterations: usize,
    pub results: Vec<StepOutcome>,
}

impl ExecutionSummary {
    pub fn from_plan(plan: &Plan, iterations: usize) -> Self {
        let results = plan
            .steps
            .iter()
            .map(|s| StepOutcome {
                step_id: s.step_id,
                tool: s.tool.clone(),
                status: s.status,
                result: s.result.clone(),
                error: s.error.clone().or_else(|| s.blocked_reason.clone()),
                error_kind: s.error_kind,
            })
            .collect();

        Self {
            plan_id: plan.id.clone(),
            plan_status: plan.status,
            steps_completed: plan.count_with_status(StepStatus::Completed),
            steps_failed: plan.count_with_status(StepStatus::Failed),
            steps_blocked: plan
                .steps
                .iter()
                .filter(|s| s.blocked_reason.is_some())
                .count(),
            iterations,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.plan_status == PlanStatus::Completed
    }
}

/// 执行引擎
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    /// 为 true 时并发执行同一就绪集合中的步骤（集合内互不依赖），批次之间是同步屏障
    parallel: bool,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// 执行计划；只在本次调用期间借用计划
    pub async fn execute_plan(&self, plan: &mut Plan, invoker: &dyn StepInvoker) -> ExecutionSummary {
        if plan.status == PlanStatus::Created {
            plan.mark_ready();
        }
        if !plan.set_status(PlanStatus::Executing) {
            tracing::warn!(plan = %plan.id, status = ?plan.status, "plan is not ready, skipping execution");
            return ExecutionSummary::from_plan(plan, 0);
        }

        tracing::info!(plan = %plan.id, steps = plan.steps.len(), parallel = self.parallel, "executing plan");

        let graph = PlanGraph::new(plan);
        if graph.has_cycle() {
            tracing::warn!(plan = %plan.id, "plan contains a dependency cycle, affected steps will never run");
        }
        let mut iterations = 0;

        loop {
            let ready = graph.ready_steps(plan);
            if ready.is_empty() {
                break;
            }
            iterations += 1;
            tracing::debug!(plan = %plan.id, iteration = iterations, ready = ?ready, "ready set");

            if self.parallel {
                self.run_batch_parallel(plan, &ready, invoker).await;
            } else {
                for step_id in ready {
                    if let Some((tool, args)) = start_step(plan, step_id) {
                        let outcome = match tool {
                            Some(name) => Some(invoker.invoke(&name, args).await),
                            None => None,
                        };
                        finish_step(plan, step_id, outcome);
                    }
                }
            }
        }

        let final_status = if plan.all_completed() {
            PlanStatus::Completed
        } else {
            annotate_blocked(plan, &graph);
            PlanStatus::Failed
        };
        plan.set_status(final_status);

        let summary = ExecutionSummary::from_plan(plan, iterations);
        tracing::info!(
            plan = %plan.id,
            plan_status = ?summary.plan_status,
            completed = summary.steps_completed,
            failed = summary.steps_failed,
            blocked = summary.steps_blocked,
            iterations,
            "plan finished"
        );
        summary
    }

    async fn run_batch_parallel(&self, plan: &mut Plan, ready: &[StepId], invoker: &dyn StepInvoker) {
        let jobs: Vec<(StepId, Option<String>, Value)> = ready
            .iter()
            .filter_map(|id| start_step(plan, *id).map(|(tool, args)| (*id, tool, args)))
            .collect();

        // 整批全部到达终态后才重新计算就绪集合
        let outcomes = join_all(jobs.into_iter().map(|(step_id, tool, args)| async move {
            let outcome = match tool {
                Some(name) => Some(invoker.invoke(&name, args).await),
                None => None,
            };
            (step_id, outcome)
        }))
        .await;

        for (step_id, outcome) in outcomes {
            finish_step(plan, step_id, outcome);
        }
    }
}

/// 标记步骤为 InProgress，返回其工具名与参数
fn start_step(plan: &mut Plan, step_id: StepId) -> Option<(Option<String>, Value)> {
    let step = plan.get_step_mut(step_id)?;
    if !step.mark_in_progress() {
        return None;
    }
    tracing::debug!(step_id, tool = ?step.tool, "step started");
    Some((step.tool.clone(), step.args.clone()))
}

fn finish_step(plan: &mut Plan, step_id: StepId, outcome: Option<InvocationResult>) {
    let Some(step) = plan.get_step_mut(step_id) else {
        return;
    };
    match outcome {
        None => {
            step.mark_completed(json!({ "message": "Step completed without tool execution" }));
        }
        Some(result) if result.success => {
            step.mark_completed(result.result.unwrap_or(Value::Null));
        }
        Some(result) => {
            let error = result
                .error
                .unwrap_or_else(|| "Tool invocation failed".to_string());
            tracing::warn!(step_id, tool = %result.tool, error = %error, "step failed");
            step.mark_failed(error, result.error_kind, result.result);
        }
    }
}

fn annotate_blocked(plan: &mut Plan, graph: &PlanGraph) {
    let view: &Plan = plan;
    let reasons: Vec<(StepId, String)> = view
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .map(|s| {
            let reason = graph
                .blocked_reason(view, s.step_id)
                .map(|r| r.to_string())
                .unwrap_or_else(|| "blocked: dependencies never completed".to_string());
            (s.step_id, reason)
        })
        .collect();

    for (step_id, reason) in reasons {
        if let Some(step) = plan.get_step_mut(step_id) {
            step.mark_blocked(reason);
        }
    }
}
