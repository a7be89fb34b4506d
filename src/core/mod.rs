//! 核心编排层：错误类型、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use error::{OrchestratorError, ToolErrorKind};
pub use orchestrator::{Orchestrator, Statistics, TaskReport, ToolListing};
