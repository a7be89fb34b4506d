//! 编排器构建器：统一的初始化逻辑
//!
//! 从 AppConfig 注册内置工具、设置单步截止时间与调度方式，并加载历史记录。

use std::path::PathBuf;

use crate::config::AppConfig;
use crate::core::{Orchestrator, OrchestratorError};
use crate::history::HistoryStore;
use crate::plan::ExecutionEngine;
use crate::tools::{CalculatorTool, FileOperationTool, TextAnalysisTool, ToolExecutor, ToolRegistry};

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    data_dir: Option<PathBuf>,
    in_memory: bool,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            data_dir: None,
            in_memory: false,
        }
    }

    /// 覆盖配置中的历史存储目录
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// 历史只保存在内存中
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// 构建内置工具注册表
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools =
            ToolRegistry::new().with_max_latency_samples(self.config.tools.max_latency_samples);

        tools.register(CalculatorTool);
        tools.register(TextAnalysisTool);

        if self.config.tools.enable_file_operations {
            let root = self
                .config
                .tools
                .filesystem_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            tools.register(FileOperationTool::new(root));
        }

        tools
    }

    /// 构建编排器并加载历史；历史文件损坏时返回错误
    pub async fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let registry = self.build_tool_registry();
        let executor = ToolExecutor::new(registry, self.config.engine.step_timeout_secs);
        let engine = ExecutionEngine::new().with_parallel(self.config.engine.parallel_ready_set);

        let history = if self.in_memory {
            HistoryStore::in_memory()
        } else {
            let dir = self
                .data_dir
                .clone()
                .unwrap_or_else(|| self.config.app.data_dir.clone());
            HistoryStore::new(dir)
        };
        history.load().await?;

        tracing::info!(
            tools = executor.registry().len(),
            parallel = engine.is_parallel(),
            "orchestrator built"
        );
        Ok(Orchestrator::new(executor, history).with_engine(engine))
    }
}
