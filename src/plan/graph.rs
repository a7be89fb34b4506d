//! 计划依赖图
//!
//! 用邻接表记录步骤间依赖，计算就绪集合；调度结束后为永远无法执行的步骤追溯原因
//! （上游失败、依赖不存在、依赖成环）。

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::plan::types::{Plan, StepId, StepStatus};

/// 步骤无法执行的根因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// 某个（直接或间接）依赖失败
    FailedDependency(StepId),
    /// 引用了计划中不存在的步骤
    MissingDependency(StepId),
    /// 依赖链回到了自身
    Cycle(StepId),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::FailedDependency(id) => write!(f, "blocked: dependency step {} failed", id),
            BlockReason::MissingDependency(id) => {
                write!(f, "blocked: dependency step {} does not exist", id)
            }
            BlockReason::Cycle(id) => write!(f, "blocked: dependency cycle through step {}", id),
        }
    }
}

/// 计划依赖图
pub struct PlanGraph {
    /// 邻接表：步骤 ID -> 依赖该步骤的步骤列表
    pub dependents: HashMap<StepId, Vec<StepId>>,
    /// 步骤 ID -> 声明的依赖（保持声明顺序）
    pub dependencies: HashMap<StepId, Vec<StepId>>,
}

impl PlanGraph {
    pub fn new(plan: &Plan) -> Self {
        let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
        let mut dependencies: HashMap<StepId, Vec<StepId>> = HashMap::new();

        for step in &plan.steps {
            dependents.entry(step.step_id).or_default();
            dependencies.insert(step.step_id, step.dependencies.clone());
            for dep in &step.dependencies {
                dependents.entry(*dep).or_default().push(step.step_id);
            }
        }

        Self {
            dependents,
            dependencies,
        }
    }

    /// 就绪集合：状态为 Pending 且所有依赖都解析为 Completed 的步骤，按 ID 升序
    pub fn ready_steps(&self, plan: &Plan) -> Vec<StepId> {
        let mut ready: Vec<StepId> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| {
                s.dependencies.iter().all(|dep| {
                    plan.get_step(*dep)
                        .map(|d| d.status == StepStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .map(|s| s.step_id)
            .collect();
        ready.sort_unstable();
        ready
    }

    /// 追溯一个 Pending 步骤为何无法执行；依赖仍可能完成时返回 None
    pub fn blocked_reason(&self, plan: &Plan, step_id: StepId) -> Option<BlockReason> {
        let mut visiting = HashSet::new();
        let mut cleared = HashSet::new();
        self.trace(plan, step_id, &mut visiting, &mut cleared)
    }

    fn trace(
        &self,
        plan: &Plan,
        step_id: StepId,
        visiting: &mut HashSet<StepId>,
        cleared: &mut HashSet<StepId>,
    ) -> Option<BlockReason> {
        if cleared.contains(&step_id) {
            return None;
        }
        if !visiting.insert(step_id) {
            return Some(BlockReason::Cycle(step_id));
        }

        let deps = self.dependencies.get(&step_id).cloned().unwrap_or_default();
        for dep in deps {
            let Some(dep_step) = plan.get_step(dep) else {
                return Some(BlockReason::MissingDependency(dep));
            };
            match dep_step.status {
                StepStatus::Failed => return Some(BlockReason::FailedDependency(dep)),
                StepStatus::Pending => {
                    if let Some(reason) = self.trace(plan, dep, visiting, cleared) {
                        return Some(reason);
                    }
                }
                StepStatus::InProgress | StepStatus::Completed => {}
            }
        }

        visiting.remove(&step_id);
        cleared.insert(step_id);
        None
    }

    /// 图中是否存在环（只看计划内存在的步骤）
    pub fn has_cycle(&self) -> bool {
        // Kahn 拓扑排序：剩余入度非 0 的节点即在环上
        let mut in_degree: HashMap<StepId, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| {
                let known = deps
                    .iter()
                    .filter(|d| self.dependencies.contains_key(d))
                    .count();
                (*id, known)
            })
            .collect();

        let mut queue: Vec<StepId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;

        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(children) = self.dependents.get(&id) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(*child);
                        }
                    }
                }
            }
        }

        visited < self.dependencies.len()
    }
}
