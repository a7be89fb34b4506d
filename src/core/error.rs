//! 编排错误类型与工具失败分类
//!
//! OrchestratorError 只用于需要上抛给调用方的硬错误（存储读取、非法计划、未知复杂度等）；
//! 单个工具 / 单个步骤内部的失败一律以 ToolErrorKind + 错误文本的形式作为数据保存在结果里。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 编排过程中需要上抛的错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Unknown complexity tier: {0}")]
    UnknownComplexity(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        OrchestratorError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        OrchestratorError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(e: config::ConfigError) -> Self {
        OrchestratorError::ConfigError(e.to_string())
    }
}

/// 工具调用失败的分类（作为数据记录在 InvocationResult / Step 中，不会作为错误上抛）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// 注册表中没有该工具
    NotFound,
    /// 工具自身的参数校验未通过
    InvalidInput,
    /// 工具执行体返回错误或 panic
    ExecutionFailed,
    /// 超过单步截止时间
    Timeout,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::InvalidInput => "invalid_input",
            ToolErrorKind::ExecutionFailed => "execution_failed",
            ToolErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ToolErrorKind::InvalidInput).unwrap();
        assert_eq!(json, "\"invalid_input\"");
        let kind: ToolErrorKind = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(kind, ToolErrorKind::Timeout);
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: OrchestratorError = io.into();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert!(err.to_string().contains("denied"));
    }
}
