//! 编排器：任务理解 -> 计划构建 -> 依赖调度执行 -> 记录反馈
//!
//! 一次 process_task 完整跑完一个任务后才返回；工具与步骤内部的失败都以数据形式出现在报告里，
//! 只有构建计划时的非法输入会作为错误上抛。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::{KeywordClassifier, TaskAnalysis, TaskClassifier};
use crate::core::OrchestratorError;
use crate::history::{HistoryStore, Insights};
use crate::plan::{ExecutionEngine, ExecutionSummary, PlanBuilder, PlanStatus};
use crate::tools::{Tool, ToolExecutor, ToolMetadata, ToolRegistry, ToolStats};

/// 单个任务的处理报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: String,
    pub analysis: TaskAnalysis,
    /// 执行后的计划快照
    pub plan: Value,
    pub execution_result: ExecutionSummary,
    /// 与计划最终状态一致
    pub status: PlanStatus,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.status == PlanStatus::Completed
    }
}

/// 工具统计 + 历史洞察
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub tools: BTreeMap<String, ToolStats>,
    pub learning: Insights,
}

/// 已注册工具及类别索引
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolListing {
    pub tools: Vec<ToolMetadata>,
    pub categories: BTreeMap<String, Vec<String>>,
}

/// 编排器
pub struct Orchestrator {
    classifier: Box<dyn TaskClassifier>,
    builder: PlanBuilder,
    engine: ExecutionEngine,
    executor: ToolExecutor,
    history: HistoryStore,
}

impl Orchestrator {
    pub fn new(executor: ToolExecutor, history: HistoryStore) -> Self {
        Self {
            classifier: Box::new(KeywordClassifier::new()),
            builder: PlanBuilder::new(),
            engine: ExecutionEngine::new(),
            executor,
            history,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn TaskClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// 注册工具；同名工具会被替换，计数从零开始
    pub fn register_tool(&mut self, tool: impl Tool + 'static) {
        self.executor.registry_mut().register(tool);
    }

    pub fn register_tool_arc(&mut self, tool: Arc<dyn Tool>) {
        self.executor.registry_mut().register_arc(tool);
    }

    /// 处理一个任务：分类、构建计划、执行并记录
    pub async fn process_task(&self, task: &str) -> Result<TaskReport, OrchestratorError> {
        tracing::info!(task = %task, "processing task");
        let analysis = self.classifier.classify(task);
        self.process_analysis(task, analysis).await
    }

    /// 使用外部给定的分类结果处理任务
    pub async fn process_analysis(
        &self,
        task: &str,
        analysis: TaskAnalysis,
    ) -> Result<TaskReport, OrchestratorError> {
        let mut plan = self.builder.build(task, &analysis)?;
        let summary = self.engine.execute_plan(&mut plan, &self.executor).await;
        self.history.record(&plan, &summary).await;

        tracing::info!(
            plan = %plan.id,
            status = ?plan.status,
            completed = summary.steps_completed,
            failed = summary.steps_failed,
            "task processed"
        );

        Ok(TaskReport {
            task: task.to_string(),
            analysis,
            plan: plan.snapshot(),
            status: plan.status,
            execution_result: summary,
        })
    }

    pub async fn statistics(&self) -> Statistics {
        Statistics {
            tools: self.executor.registry().stats_all().await,
            learning: self.history.insights().await,
        }
    }

    pub fn list_tools(&self) -> ToolListing {
        let registry = self.executor.registry();
        ToolListing {
            tools: registry
                .tool_names()
                .iter()
                .filter_map(|name| registry.metadata(name).cloned())
                .collect(),
            categories: registry.categories(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}
