//! 文本统计工具：字符、单词、句子、行、段落数，可选详细统计

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::schema::{ParamType, ToolParameter};
use crate::tools::Tool;

pub struct TextAnalysisTool;

#[async_trait]
impl Tool for TextAnalysisTool {
    fn name(&self) -> &str {
        "text_analysis"
    }

    fn description(&self) -> &str {
        "Analyze text: count words, characters, sentences, lines, and provide statistics"
    }

    fn category(&self) -> &str {
        "computation"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("text", ParamType::String, "Text to analyze"),
            ToolParameter::optional("detailed", ParamType::Boolean, "Include detailed statistics")
                .with_default(Value::Bool(false)),
        ]
    }

    fn validate(&self, args: &Value) -> bool {
        args.get("text")
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or("missing text")?;
        let detailed = args.get("detailed").and_then(|v| v.as_bool()).unwrap_or(false);

        let words: Vec<&str> = text.split_whitespace().collect();
        let sentences = text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
        let paragraphs = text.split("\n\n").filter(|p| !p.trim().is_empty()).count();

        let mut stats = json!({
            "characters": text.chars().count(),
            "characters_no_spaces": text.chars().filter(|c| *c != ' ').count(),
            "words": words.len(),
            "sentences": sentences,
            "lines": text.split('\n').count(),
            "paragraphs": paragraphs,
        });

        if detailed {
            let average = if words.is_empty() {
                0.0
            } else {
                words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64
            };
            let unique: HashSet<&str> = words.iter().copied().collect();
            // 长度相同时取最先出现的单词
            let mut longest = "";
            for w in &words {
                if w.chars().count() > longest.chars().count() {
                    longest = w;
                }
            }
            if let Some(obj) = stats.as_object_mut() {
                obj.insert("average_word_length".to_string(), json!(average));
                obj.insert("unique_words".to_string(), json!(unique.len()));
                obj.insert("longest_word".to_string(), json!(longest));
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_counts() {
        let tool = TextAnalysisTool;
        let stats = tool
            .execute(json!({"text": "Hello World! This is a test."}))
            .await
            .unwrap();
        assert_eq!(stats["words"], 6);
        assert_eq!(stats["characters"], 28);
        assert_eq!(stats["sentences"], 2);
        assert_eq!(stats["lines"], 1);
        assert_eq!(stats["paragraphs"], 1);
        assert!(stats.get("unique_words").is_none());
    }

    #[tokio::test]
    async fn test_detailed_counts() {
        let tool = TextAnalysisTool;
        let stats = tool
            .execute(json!({"text": "the cat saw the elephant", "detailed": true}))
            .await
            .unwrap();
        assert_eq!(stats["unique_words"], 4);
        assert_eq!(stats["longest_word"], "elephant");
        assert_eq!(stats["average_word_length"], 4.0);
    }

    #[test]
    fn test_validate_requires_text() {
        let tool = TextAnalysisTool;
        assert!(tool.validate(&json!({"text": "x"})));
        assert!(!tool.validate(&json!({"text": ""})));
        assert!(!tool.validate(&json!({})));
    }
}
