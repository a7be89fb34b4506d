//! Forager - Rust 任务编排系统
//!
//! 模块划分：
//! - **classifier**: 任务理解（复杂度等级、候选工具、参数提取）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、编排器与构建器
//! - **history**: 执行历史、聚合指标与持久化
//! - **observability**: tracing 初始化
//! - **plan**: 计划模型、依赖图、计划构建器与执行引擎
//! - **tools**: 工具 trait、注册表、执行器与内置工具（calculator、text_analysis、file_operation）

pub mod classifier;
pub mod config;
pub mod core;
pub mod history;
pub mod observability;
pub mod plan;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, OrchestratorError, TaskReport};
