//! 工具注册表
//!
//! 所有工具实现 Tool trait（元数据 + validate + execute），由 ToolRegistry 按名注册与查找。
//! invoke 是工具失败的唯一边界：未注册、参数非法、执行出错 / panic / 超时都在这里转为
//! 结构化的 InvocationResult，不会继续向上传播。每个工具的使用计数同样只在这里修改。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::ToolErrorKind;
use crate::tools::schema::{function_schema, ToolParameter};

/// 参数校验失败时的固定错误文本
pub const INVALID_INPUT_MESSAGE: &str = "Invalid input parameters";

/// 默认保留的延迟样本数
pub const DEFAULT_MAX_LATENCY_SAMPLES: usize = 100;

/// 工具 trait：静态元数据、参数校验、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（注册表的键）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 分类，用于按类别列出工具
    fn category(&self) -> &str {
        "general"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// 声明的参数列表
    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    /// 执行前的参数校验；返回 false 时不会运行 execute
    fn validate(&self, args: &Value) -> bool;

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<Value, String>;

    /// function-calling schema
    fn to_schema(&self) -> Value {
        function_schema(self.name(), self.description(), &self.parameters())
    }
}

/// 注册时记录的工具元数据快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: String,
    pub parameters: Vec<ToolParameter>,
    pub registered_at: String,
}

impl ToolMetadata {
    fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            category: tool.category().to_string(),
            version: tool.version().to_string(),
            parameters: tool.parameters(),
            registered_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 累计使用计数
#[derive(Debug, Clone, Default)]
struct ToolUsage {
    invocations: u64,
    successes: u64,
    errors: u64,
    latencies: VecDeque<f64>,
    last_used: Option<String>,
}

impl ToolUsage {
    fn touch(&mut self) {
        self.invocations += 1;
        self.last_used = Some(chrono::Utc::now().to_rfc3339());
    }

    fn record_latency(&mut self, secs: f64, max_samples: usize) {
        if max_samples == 0 {
            return;
        }
        while self.latencies.len() >= max_samples {
            self.latencies.pop_front();
        }
        self.latencies.push_back(secs);
    }

    fn average_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    metadata: ToolMetadata,
    usage: Mutex<ToolUsage>,
}

/// 单次调用的结构化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    /// 执行耗时（秒），仅成功时有值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl InvocationResult {
    pub fn success(tool: &str, result: Value, execution_time: f64) -> Self {
        Self {
            success: true,
            tool: tool.to_string(),
            result: Some(result),
            error: None,
            error_kind: None,
            execution_time: Some(execution_time),
        }
    }

    pub fn failure(tool: &str, kind: ToolErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tool: tool.to_string(),
            result: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            execution_time: None,
        }
    }
}

/// 单个工具的使用统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub name: String,
    pub category: String,
    pub version: String,
    pub usage_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// 百分比字符串，如 "75.0%"；零次调用时为 "N/A"
    pub success_rate: String,
    /// 平均执行耗时（秒），无样本时为 0
    pub average_execution_time: f64,
    pub last_used: Option<String>,
}

/// 工具注册表：按名称存储工具与使用计数，并维护 类别 -> 工具名 索引
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    categories: HashMap<String, Vec<String>>,
    max_latency_samples: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            categories: HashMap::new(),
            max_latency_samples: DEFAULT_MAX_LATENCY_SAMPLES,
        }
    }

    /// 设置延迟样本窗口大小
    pub fn with_max_latency_samples(mut self, max: usize) -> Self {
        self.max_latency_samples = max;
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册（或替换）工具。同名重复注册时后者覆盖前者，使用计数随新记录归零，
    /// 类别索引同步迁移。
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let metadata = ToolMetadata::from_tool(tool.as_ref());
        let name = metadata.name.clone();

        if let Some(previous) = self.tools.get(&name) {
            let old_category = previous.metadata.category.clone();
            if let Some(names) = self.categories.get_mut(&old_category) {
                names.retain(|n| n != &name);
                if names.is_empty() {
                    self.categories.remove(&old_category);
                }
            }
            tracing::info!(tool = %name, "tool re-registered, usage counters reset");
        }

        let names = self.categories.entry(metadata.category.clone()).or_default();
        if !names.contains(&name) {
            names.push(name.clone());
        }
        tracing::info!(tool = %name, category = %metadata.category, "tool registered");

        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                metadata,
                usage: Mutex::new(ToolUsage::default()),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.tool.clone())
    }

    pub fn metadata(&self, name: &str) -> Option<&ToolMetadata> {
        self.tools.get(name).map(|entry| &entry.metadata)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 无截止时间地调用工具
    pub async fn invoke(&self, name: &str, args: Value) -> InvocationResult {
        self.invoke_with_deadline(name, args, None).await
    }

    /// 调用工具：未注册时直接返回 NotFound 且不动计数；参数非法计为一次错误调用；
    /// 执行体返回 Err、panic 或超过 deadline 都转为失败结果。
    pub async fn invoke_with_deadline(
        &self,
        name: &str,
        args: Value,
        deadline: Option<Duration>,
    ) -> InvocationResult {
        let Some(entry) = self.tools.get(name) else {
            return InvocationResult::failure(
                name,
                ToolErrorKind::NotFound,
                format!("Tool '{}' not found", name),
            );
        };

        let validated = std::panic::catch_unwind(AssertUnwindSafe(|| entry.tool.validate(&args)));
        if !matches!(validated, Ok(true)) {
            let mut usage = entry.usage.lock().await;
            usage.touch();
            usage.errors += 1;
            let error = match validated {
                Err(panic) => format!("Validation panicked: {}", panic_message(panic.as_ref())),
                _ => INVALID_INPUT_MESSAGE.to_string(),
            };
            return InvocationResult::failure(name, ToolErrorKind::InvalidInput, error);
        }

        let start = Instant::now();
        let body = AssertUnwindSafe(entry.tool.execute(args)).catch_unwind();
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(caught) => flatten_outcome(caught),
                Err(_) => Err((
                    ToolErrorKind::Timeout,
                    format!("Tool '{}' timed out after {:.1}s", name, limit.as_secs_f64()),
                )),
            },
            None => flatten_outcome(body.await),
        };
        let elapsed = start.elapsed().as_secs_f64();
        // 同步阻塞的执行体不会让计时器触发，返回后再按耗时判定
        let outcome = match (outcome, deadline) {
            (Ok(_), Some(limit)) if elapsed > limit.as_secs_f64() => Err((
                ToolErrorKind::Timeout,
                format!("Tool '{}' exceeded its {:.1}s deadline", name, limit.as_secs_f64()),
            )),
            (outcome, _) => outcome,
        };

        let mut usage = entry.usage.lock().await;
        usage.touch();
        match outcome {
            Ok(result) => {
                usage.successes += 1;
                usage.record_latency(elapsed, self.max_latency_samples);
                InvocationResult::success(name, result, elapsed)
            }
            Err((kind, error)) => {
                usage.errors += 1;
                InvocationResult::failure(name, kind, error)
            }
        }
    }

    pub async fn stats(&self, name: &str) -> Option<ToolStats> {
        let entry = self.tools.get(name)?;
        let usage = entry.usage.lock().await;
        Some(build_stats(&entry.metadata, &usage))
    }

    pub async fn stats_all(&self) -> BTreeMap<String, ToolStats> {
        let mut all = BTreeMap::new();
        for (name, entry) in &self.tools {
            let usage = entry.usage.lock().await;
            all.insert(name.clone(), build_stats(&entry.metadata, &usage));
        }
        all
    }

    /// 列出工具名（按名称排序）；指定类别时只返回该类别下的工具（按注册顺序）
    pub fn list_tools(&self, category: Option<&str>) -> Vec<String> {
        match category {
            Some(c) => self.categories.get(c).cloned().unwrap_or_default(),
            None => self.tool_names(),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn categories(&self) -> BTreeMap<String, Vec<String>> {
        self.categories
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 全部工具的 function-calling schema（按名称排序）
    pub fn schemas(&self) -> Vec<Value> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| entry.tool.to_schema())
            .collect()
    }
}

type CaughtOutcome = Result<Result<Value, String>, Box<dyn std::any::Any + Send>>;

fn flatten_outcome(caught: CaughtOutcome) -> Result<Value, (ToolErrorKind, String)> {
    match caught {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err((ToolErrorKind::ExecutionFailed, e)),
        Err(panic) => Err((
            ToolErrorKind::ExecutionFailed,
            format!("Tool panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn build_stats(metadata: &ToolMetadata, usage: &ToolUsage) -> ToolStats {
    let success_rate = if usage.invocations > 0 {
        format!("{:.1}%", usage.successes as f64 / usage.invocations as f64 * 100.0)
    } else {
        "N/A".to_string()
    };
    ToolStats {
        name: metadata.name.clone(),
        category: metadata.category.clone(),
        version: metadata.version.clone(),
        usage_count: usage.invocations,
        success_count: usage.successes,
        error_count: usage.errors,
        success_rate,
        average_execution_time: usage.average_latency(),
        last_used: usage.last_used.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::ParamType;

    struct EchoTool {
        category: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo text back"
        }

        fn category(&self) -> &str {
            self.category
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![ToolParameter::required("text", ParamType::String, "Text to echo")]
        }

        fn validate(&self, args: &Value) -> bool {
            args.get("text").and_then(|v| v.as_str()).is_some()
        }

        async fn execute(&self, args: Value) -> Result<Value, String> {
            let text = args["text"].as_str().unwrap_or_default();
            if text == "fail" {
                return Err("asked to fail".to_string());
            }
            if text == "panic" {
                panic!("asked to panic");
            }
            Ok(Value::String(text.to_string()))
        }
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "Sleeps longer than any sane deadline"
        }

        fn validate(&self, _args: &Value) -> bool {
            true
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    /// 校验时对非对象参数直接 panic
    struct PickyTool;

    #[async_trait]
    impl Tool for PickyTool {
        fn name(&self) -> &str {
            "picky"
        }

        fn description(&self) -> &str {
            "Only accepts objects"
        }

        fn validate(&self, args: &Value) -> bool {
            args.as_object().unwrap().contains_key("text")
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            Ok(Value::Bool(true))
        }
    }

    /// 在 async 执行体里同步阻塞
    struct BlockingTool;

    #[async_trait]
    impl Tool for BlockingTool {
        fn name(&self) -> &str {
            "blocking"
        }

        fn description(&self) -> &str {
            "Blocks the thread"
        }

        fn validate(&self, _args: &Value) -> bool {
            true
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Value::Bool(true))
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { category: "text" });
        reg
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_leaves_counters() {
        let reg = registry();
        let result = reg.invoke("missing", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::NotFound));
        assert_eq!(result.error.as_deref(), Some("Tool 'missing' not found"));

        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.usage_count, 0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.success_rate, "N/A");
        assert_eq!(stats.average_execution_time, 0.0);
        assert!(reg.stats("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_invoke_success_records_latency() {
        let reg = registry();
        let result = reg.invoke("echo", serde_json::json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.result, Some(Value::String("hi".to_string())));
        assert!(result.execution_time.is_some());

        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.usage_count, 1);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.success_rate, "100.0%");
        assert!(stats.last_used.is_some());
    }

    #[tokio::test]
    async fn test_invalid_input_skips_body() {
        let reg = registry();
        let result = reg.invoke("echo", serde_json::json!({"wrong": 1})).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidInput));
        assert_eq!(result.error.as_deref(), Some(INVALID_INPUT_MESSAGE));

        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.usage_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.success_count, 0);
    }

    #[tokio::test]
    async fn test_execution_error_and_panic_are_captured() {
        let reg = registry();
        let failed = reg.invoke("echo", serde_json::json!({"text": "fail"})).await;
        assert_eq!(failed.error_kind, Some(ToolErrorKind::ExecutionFailed));
        assert_eq!(failed.error.as_deref(), Some("asked to fail"));

        let panicked = reg.invoke("echo", serde_json::json!({"text": "panic"})).await;
        assert!(!panicked.success);
        assert!(panicked.error.unwrap().contains("asked to panic"));

        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.usage_count, 2);
        assert_eq!(stats.error_count, 2);
    }

    #[tokio::test]
    async fn test_validate_panic_is_captured() {
        let mut reg = ToolRegistry::new();
        reg.register(PickyTool);

        let result = reg.invoke("picky", Value::Null).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidInput));
        assert!(result.error.unwrap().starts_with("Validation panicked"));

        let ok = reg.invoke("picky", serde_json::json!({"text": "x"})).await;
        assert!(ok.success);

        let stats = reg.stats("picky").await.unwrap();
        assert_eq!(stats.usage_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.success_count, 1);
    }

    #[tokio::test]
    async fn test_blocking_body_over_deadline_is_timeout() {
        let mut reg = ToolRegistry::new();
        reg.register(BlockingTool);

        let result = reg
            .invoke_with_deadline("blocking", Value::Null, Some(Duration::from_millis(50)))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));

        let relaxed = reg
            .invoke_with_deadline("blocking", Value::Null, Some(Duration::from_secs(5)))
            .await;
        assert!(relaxed.success);

        let stats = reg.stats("blocking").await.unwrap();
        assert_eq!(stats.usage_count, 2);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout_kind() {
        let mut reg = ToolRegistry::new();
        reg.register(SleepyTool);
        let result = reg
            .invoke_with_deadline("sleepy", Value::Null, Some(Duration::from_millis(20)))
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
        let stats = reg.stats("sleepy").await.unwrap();
        assert_eq!(stats.usage_count, 1);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_counters_stay_consistent() {
        let reg = registry();
        let inputs = [
            serde_json::json!({"text": "a"}),
            serde_json::json!({}),
            serde_json::json!({"text": "fail"}),
            serde_json::json!({"text": "b"}),
            serde_json::json!({"text": 3}),
        ];
        for args in inputs {
            reg.invoke("echo", args).await;
            reg.invoke("ghost", Value::Null).await;
        }
        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.usage_count, 5);
        assert_eq!(stats.success_count + stats.error_count, stats.usage_count);
        assert_eq!(stats.success_rate, "40.0%");
    }

    #[tokio::test]
    async fn test_reregister_replaces_and_moves_category() {
        let mut reg = registry();
        reg.invoke("echo", serde_json::json!({"text": "a"})).await;

        reg.register(EchoTool { category: "debug" });
        assert_eq!(reg.len(), 1);
        assert!(reg.list_tools(Some("text")).is_empty());
        assert_eq!(reg.list_tools(Some("debug")), vec!["echo".to_string()]);
        assert!(!reg.categories().contains_key("text"));

        let stats = reg.stats("echo").await.unwrap();
        assert_eq!(stats.category, "debug");
        assert_eq!(stats.usage_count, 0);
    }

    #[tokio::test]
    async fn test_reregister_same_category_dedups_index() {
        let mut reg = registry();
        reg.register(EchoTool { category: "text" });
        assert_eq!(reg.list_tools(Some("text")), vec!["echo".to_string()]);
    }

    #[test]
    fn test_schemas_follow_declared_parameters() {
        let reg = registry();
        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["input_schema"]["required"], serde_json::json!(["text"]));
        assert_eq!(schemas[0]["name"], "echo");
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let mut usage = ToolUsage::default();
        for i in 0..5 {
            usage.record_latency(i as f64, 3);
        }
        assert_eq!(usage.latencies.len(), 3);
        assert_eq!(usage.average_latency(), 3.0);
    }
}
