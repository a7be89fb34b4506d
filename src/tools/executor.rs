//! 工具执行器
//!
//! 持有 ToolRegistry 与单步截止时间，execute(tool_name, args) 在截止时间内调用 registry，
//! 超时在注册表内部计为一次 Timeout 失败；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::plan::StepInvoker;
use crate::tools::{InvocationResult, ToolRegistry};

/// 工具执行器：对每次调用施加截止时间，并输出审计日志
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    /// timeout_secs 为 0 时不设截止时间
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 执行指定工具；失败以 InvocationResult 返回，不会上抛
    pub async fn execute(&self, tool_name: &str, args: Value) -> InvocationResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = self
            .registry
            .invoke_with_deadline(tool_name, args, self.timeout)
            .await;

        let outcome = match result.error_kind {
            None => "ok",
            Some(kind) => kind.as_str(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

#[async_trait]
impl StepInvoker for ToolExecutor {
    async fn invoke(&self, tool: &str, args: Value) -> InvocationResult {
        self.execute(tool, args).await
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolErrorKind;
    use crate::tools::Tool;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Takes a while"
        }

        fn validate(&self, _args: &Value) -> bool {
            true
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Value::Bool(true))
        }
    }

    #[tokio::test]
    async fn test_executor_applies_deadline() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, 0).with_timeout(Some(Duration::from_millis(10)));

        let result = executor.execute("slow", Value::Null).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_zero_timeout_means_no_deadline() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, 0);

        let result = executor.execute("slow", Value::Null).await;
        assert!(result.success);
        assert_eq!(executor.tool_names(), vec!["slow".to_string()]);
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
