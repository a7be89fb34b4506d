//! 任务理解：把原始任务文本映射为复杂度等级与候选工具列表
//!
//! TaskClassifier 是可替换的策略接口；默认实现 KeywordClassifier 基于关键词规则，不调用模型。

pub mod keyword;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::OrchestratorError;

pub use keyword::KeywordClassifier;

/// 复杂度等级，决定 PlanBuilder 使用的模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }

    /// 该等级的预估步骤数
    pub fn estimated_steps(&self) -> usize {
        match self {
            Complexity::Simple => 1,
            Complexity::Moderate => 3,
            Complexity::Complex => 5,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "moderate" => Ok(Complexity::Moderate),
            "complex" => Ok(Complexity::Complex),
            other => Err(OrchestratorError::UnknownComplexity(other.to_string())),
        }
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub original_task: String,
    pub complexity: Complexity,
    /// 候选工具（有序）
    pub candidate_tools: Vec<String>,
    pub estimated_steps: usize,
    /// 从任务文本中提取到的工具参数：工具名 -> JSON 对象
    #[serde(default)]
    pub tool_args: BTreeMap<String, Value>,
    pub timestamp: String,
}

impl TaskAnalysis {
    /// 由外部给定的等级与工具构造（不做参数提取）
    pub fn new(task: impl Into<String>, complexity: Complexity, candidate_tools: Vec<String>) -> Self {
        Self {
            original_task: task.into(),
            complexity,
            candidate_tools,
            estimated_steps: complexity.estimated_steps(),
            tool_args: BTreeMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_tool_args(mut self, tool: impl Into<String>, args: Value) -> Self {
        self.tool_args.insert(tool.into(), args);
        self
    }
}

/// 任务分类器：对同一输入必须给出确定的结果
pub trait TaskClassifier: Send + Sync {
    fn classify(&self, task: &str) -> TaskAnalysis;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_from_str() {
        assert_eq!("Simple".parse::<Complexity>().unwrap(), Complexity::Simple);
        assert_eq!(" complex ".parse::<Complexity>().unwrap(), Complexity::Complex);
        let err = "epic".parse::<Complexity>().unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownComplexity(ref t) if t == "epic"));
    }

    #[test]
    fn test_analysis_serializes_snake_case() {
        let analysis = TaskAnalysis::new("x", Complexity::Moderate, vec!["calculator".into()]);
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["complexity"], "moderate");
        assert_eq!(json["estimated_steps"], 3);
    }
}
