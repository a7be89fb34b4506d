//! 计划构建器
//!
//! 把分类结果（复杂度 + 有序候选工具）确定性地翻译为计划骨架：
//! - simple：单步，描述即任务原文，工具为第一个候选（可为空）
//! - moderate：每个候选工具一步，严格线性链
//! - complex：分解占位步 -> 各工具步 -> 汇总占位步
//!
//! 构建完成后计划状态为 Ready，不启动执行。

use crate::classifier::{Complexity, TaskAnalysis};
use crate::core::OrchestratorError;
use crate::plan::types::{Plan, Step, StepId};

/// 计划构建器
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder;

impl PlanBuilder {
    pub fn new() -> Self {
        Self
    }

    /// 由分类结果构建计划，并把提取到的工具参数挂到对应步骤上
    pub fn build(&self, task: &str, analysis: &TaskAnalysis) -> Result<Plan, OrchestratorError> {
        let mut plan = self.assemble(task, analysis.complexity, &analysis.candidate_tools)?;

        for step in plan.steps.iter_mut() {
            if let Some(args) = step.tool.as_ref().and_then(|t| analysis.tool_args.get(t)) {
                step.args = args.clone();
            }
        }

        plan.mark_ready();
        tracing::info!(
            plan = %plan.id,
            complexity = %analysis.complexity,
            steps = plan.steps.len(),
            "plan built"
        );
        Ok(plan)
    }

    /// 由字符串等级构建（未知等级返回 UnknownComplexity）
    pub fn from_tier(
        &self,
        task: &str,
        tier: &str,
        candidate_tools: &[String],
    ) -> Result<Plan, OrchestratorError> {
        let complexity: Complexity = tier.parse()?;
        let mut plan = self.assemble(task, complexity, candidate_tools)?;
        plan.mark_ready();
        Ok(plan)
    }

    fn assemble(
        &self,
        task: &str,
        complexity: Complexity,
        tools: &[String],
    ) -> Result<Plan, OrchestratorError> {
        let mut plan = Plan::new(task);

        match complexity {
            Complexity::Simple => {
                plan.add_step(Step::new(1, task).with_optional_tool(tools.first().cloned()))?;
            }
            Complexity::Moderate => {
                for (i, tool) in tools.iter().enumerate() {
                    let step_id = (i + 1) as StepId;
                    let step = Step::new(step_id, format!("Execute {} for: {}", tool, task))
                        .with_tool(tool.clone())
                        .depends_on(previous(step_id));
                    plan.add_step(step)?;
                }
            }
            Complexity::Complex => {
                plan.add_step(Step::new(1, "Understand and break down the task"))?;
                for (i, tool) in tools.iter().enumerate() {
                    let step_id = (i + 2) as StepId;
                    let step = Step::new(step_id, format!("Execute {}", tool))
                        .with_tool(tool.clone())
                        .depends_on(previous(step_id));
                    plan.add_step(step)?;
                }
                let last = (tools.len() + 2) as StepId;
                plan.add_step(Step::new(last, "Synthesize results").depends_on(previous(last)))?;
            }
        }

        Ok(plan)
    }
}

fn previous(step_id: StepId) -> Vec<StepId> {
    if step_id > 1 {
        vec![step_id - 1]
    } else {
        Vec::new()
    }
}
