//! 关键词分类器
//!
//! 复杂度：词数 + 指示词（then / after / if / calculate ...）计数；
//! 候选工具：按固定顺序匹配关键词组；
//! 工具参数：用正则从任务文本中提取（算式、引号内文本、文件路径），提取不到则留空，
//! 由工具自身的参数校验决定该步骤失败。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::classifier::{Complexity, TaskAnalysis, TaskClassifier};

/// 复杂度指示词（子串匹配）
const COMPLEXITY_INDICATORS: [&str; 10] = [
    "then", "after", "before", "if", "when", "multiple", "calculate", "analyze", "compare", "find",
];

/// 工具关键词组，顺序即候选工具顺序
const TOOL_KEYWORDS: [(&str, &[&str]); 5] = [
    ("calculator", &["calculate", "compute", "math", "add", "multiply"]),
    ("file_operation", &["file", "read", "write", "save", "load"]),
    ("text_analysis", &["analyze text", "count words", "statistics"]),
    ("web_search", &["search", "find online", "web"]),
    ("database", &["database", "query", "sql"]),
];

static BINARY_RE: OnceLock<Regex> = OnceLock::new();
static WORD_OP_RE: OnceLock<Regex> = OnceLock::new();
static SQRT_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();

fn binary_re() -> &'static Regex {
    BINARY_RE.get_or_init(|| {
        Regex::new(r"(-?\d+(?:\.\d+)?)\s*([-+*/^×])\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
    })
}

fn word_op_re() -> &'static Regex {
    WORD_OP_RE.get_or_init(|| {
        Regex::new(
            r"\b(add|multiply|subtract|divide)\s+(-?\d+(?:\.\d+)?)\s+(?:and|by|from|with|to)\s+(-?\d+(?:\.\d+)?)",
        )
        .expect("valid regex")
    })
}

fn sqrt_re() -> &'static Regex {
    SQRT_RE.get_or_init(|| {
        Regex::new(r"(?:square root of|sqrt)\s*\(?\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
    })
}

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r#"'([^']+)'|"([^"]+)""#).expect("valid regex"))
}

/// 基于关键词规则的分类器
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn assess_complexity(&self, task: &str) -> Complexity {
        let lower = task.to_lowercase();
        let word_count = task.split_whitespace().count();
        let indicator_count = COMPLEXITY_INDICATORS
            .iter()
            .filter(|w| lower.contains(*w))
            .count();

        if word_count < 10 && indicator_count == 0 {
            Complexity::Simple
        } else if word_count < 30 && indicator_count < 3 {
            Complexity::Moderate
        } else {
            Complexity::Complex
        }
    }

    pub fn detect_tools(&self, task: &str) -> Vec<String> {
        let lower = task.to_lowercase();
        TOOL_KEYWORDS
            .iter()
            .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(tool, _)| tool.to_string())
            .collect()
    }

    /// 为已检测到的工具提取参数
    pub fn extract_args(&self, task: &str, tools: &[String]) -> BTreeMap<String, Value> {
        let mut args = BTreeMap::new();
        for tool in tools {
            let extracted = match tool.as_str() {
                "calculator" => calculator_args(task),
                "text_analysis" => first_quoted(task).map(|text| json!({ "text": text })),
                "file_operation" => file_args(task),
                _ => None,
            };
            if let Some(value) = extracted {
                args.insert(tool.clone(), value);
            }
        }
        args
    }
}

impl TaskClassifier for KeywordClassifier {
    fn classify(&self, task: &str) -> TaskAnalysis {
        let complexity = self.assess_complexity(task);
        let candidate_tools = self.detect_tools(task);
        let tool_args = self.extract_args(task, &candidate_tools);

        tracing::info!(
            complexity = %complexity,
            tools = %candidate_tools.join(","),
            "task classified"
        );

        TaskAnalysis {
            original_task: task.to_string(),
            complexity,
            estimated_steps: complexity.estimated_steps(),
            candidate_tools,
            tool_args,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}

fn calculator_args(task: &str) -> Option<Value> {
    let lower = task.to_lowercase();

    if let Some(caps) = sqrt_re().captures(&lower) {
        let a = parse_number(&caps[1])?;
        return Some(json!({ "operation": "sqrt", "a": a }));
    }

    if let Some(caps) = word_op_re().captures(&lower) {
        let first = parse_number(&caps[2])?;
        let second = parse_number(&caps[3])?;
        let op = &caps[1];
        // "subtract 3 from 10" => 10 - 3
        let (a, b) = if op == "subtract" && caps[0].contains(" from ") {
            (second, first)
        } else {
            (first, second)
        };
        return Some(json!({ "operation": op, "a": a, "b": b }));
    }

    let caps = binary_re().captures(&lower)?;
    let a = parse_number(&caps[1])?;
    let b = parse_number(&caps[3])?;
    let op = match &caps[2] {
        "+" => "add",
        "-" => "subtract",
        "*" | "×" => "multiply",
        "/" => "divide",
        "^" => "power",
        _ => return None,
    };
    Some(json!({ "operation": op, "a": a, "b": b }))
}

fn first_quoted(task: &str) -> Option<String> {
    let caps = quoted_re().captures(task)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// 形如 `notes.txt`、`data/report.md`、`./logs` 的词视为路径
fn looks_like_path(token: &str) -> bool {
    if token.is_empty() || token.starts_with("http") {
        return false;
    }
    if token.contains('/') {
        return true;
    }
    match token.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn find_path(task: &str) -> Option<String> {
    task.split_whitespace()
        .map(|t| {
            t.trim_matches(|c| c == '\'' || c == '"')
                .trim_end_matches(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
        })
        .find(|t| looks_like_path(t))
        .map(|t| t.to_string())
}

fn file_args(task: &str) -> Option<Value> {
    let lower = task.to_lowercase();
    let path = find_path(task)?;

    if lower.contains("write") || lower.contains("save") {
        let content = first_quoted(task).filter(|c| c != &path)?;
        return Some(json!({ "operation": "write", "path": path, "content": content }));
    }
    let operation = if lower.contains("list") {
        "list"
    } else if lower.contains("delete") || lower.contains("remove") {
        "delete"
    } else if lower.contains("exist") {
        "exists"
    } else {
        "read"
    };
    Some(json!({ "operation": operation, "path": path }))
}
