//! 历史 / 反馈存储
//!
//! 追加式执行日志 + 增量维护的聚合指标。record 的「追加、更新指标、落盘」在同一把锁内完成，
//! 并发调用按顺序串行。落盘失败时只记日志并标记 dirty，内存中的日志仍然权威，下次 record 重试；
//! flush 会把错误返回给调用方。

use std::path::Path;

use tokio::sync::Mutex;

use crate::core::OrchestratorError;
use crate::history::persistence::HistoryPersistence;
use crate::history::{ExecutionRecord, Insights, PerformanceMetrics};
use crate::plan::{ExecutionSummary, Plan};

#[derive(Debug, Default)]
struct HistoryState {
    log: Vec<ExecutionRecord>,
    metrics: PerformanceMetrics,
    /// 内存状态领先于磁盘
    dirty: bool,
}

/// 历史存储
#[derive(Debug)]
pub struct HistoryStore {
    persistence: Option<HistoryPersistence>,
    state: Mutex<HistoryState>,
}

impl HistoryStore {
    /// 绑定存储目录（目录在首次写入时创建）
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            persistence: Some(HistoryPersistence::new(dir)),
            state: Mutex::new(HistoryState::default()),
        }
    }

    /// 纯内存存储，不落盘
    pub fn in_memory() -> Self {
        Self {
            persistence: None,
            state: Mutex::new(HistoryState::default()),
        }
    }

    pub fn persistence(&self) -> Option<&HistoryPersistence> {
        self.persistence.as_ref()
    }

    /// 读取已持久化的日志；文件缺失不是错误。指标一律从日志重建，缓存不一致时记警告。
    pub async fn load(&self) -> Result<usize, OrchestratorError> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };

        let log = persistence.load_log()?;
        let metrics = PerformanceMetrics::rebuild(&log);
        match persistence.load_metrics() {
            Ok(Some(cached)) if cached != metrics => {
                tracing::warn!(
                    path = %persistence.metrics_path().display(),
                    "metrics cache is stale, rebuilt from execution log"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "metrics cache unreadable, rebuilt from execution log");
            }
        }

        let count = log.len();
        let mut state = self.state.lock().await;
        state.log = log;
        state.metrics = metrics;
        state.dirty = false;
        tracing::info!(records = count, "execution history loaded");
        Ok(count)
    }

    /// 追加一条执行记录并写穿到磁盘
    pub async fn record(&self, plan: &Plan, summary: &ExecutionSummary) -> ExecutionRecord {
        let record = ExecutionRecord::new(plan, summary);

        let mut state = self.state.lock().await;
        state.metrics.apply(&record);
        state.log.push(record.clone());
        state.dirty = true;
        tracing::info!(
            total_executions = state.metrics.total_executions,
            success = record.success,
            "execution recorded"
        );

        if let Err(e) = self.persist(&mut state) {
            tracing::error!(error = %e, "failed to persist execution history, will retry on next record");
        }
        record
    }

    /// 将未落盘的状态写入磁盘
    pub async fn flush(&self) -> Result<(), OrchestratorError> {
        let mut state = self.state.lock().await;
        self.persist(&mut state)
    }

    fn persist(&self, state: &mut HistoryState) -> Result<(), OrchestratorError> {
        let Some(persistence) = &self.persistence else {
            state.dirty = false;
            return Ok(());
        };
        if !state.dirty {
            return Ok(());
        }
        persistence.save(&state.log, &state.metrics)?;
        state.dirty = false;
        Ok(())
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    pub async fn insights(&self) -> Insights {
        self.state.lock().await.metrics.insights()
    }

    pub async fn metrics(&self) -> PerformanceMetrics {
        self.state.lock().await.metrics.clone()
    }

    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.state.lock().await.log.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.log.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::record_with;
    use crate::plan::{PlanStatus, StepStatus};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn plan_and_summary(success: bool, steps: &[(Option<&str>, StepStatus)]) -> (Plan, ExecutionSummary) {
        let record = record_with(success, steps);
        let mut plan = Plan::new(record.task.clone());
        plan.status = if success {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        (plan, record.result)
    }

    #[tokio::test]
    async fn test_record_writes_through() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("learning"));
        let (plan, summary) = plan_and_summary(true, &[(Some("calculator"), StepStatus::Completed)]);

        let record = store.record(&plan, &summary).await;

        assert!(record.success);
        assert!(!store.is_dirty().await);
        let log_path = dir.path().join("learning").join("execution_log.json");
        let saved: Vec<ExecutionRecord> =
            serde_json::from_str(&std::fs::read_to_string(log_path).unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].task, plan.task);
    }

    #[tokio::test]
    async fn test_load_restores_history() {
        let dir = TempDir::new().unwrap();
        {
            let store = HistoryStore::new(dir.path());
            let (plan, summary) = plan_and_summary(true, &[(Some("calculator"), StepStatus::Completed)]);
            store.record(&plan, &summary).await;
            let (plan, summary) = plan_and_summary(false, &[(Some("text_analysis"), StepStatus::Failed)]);
            store.record(&plan, &summary).await;
        }

        let store = HistoryStore::new(dir.path());
        assert_eq!(store.load().await.unwrap(), 2);
        let insights = store.insights().await;
        assert_eq!(insights.total_executions, 2);
        assert_eq!(insights.success_rate, "50.0%");
        assert_eq!(insights.total_tools_used, 2);
    }

    #[tokio::test]
    async fn test_load_missing_dir_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("never-written"));
        assert_eq!(store.load().await.unwrap(), 0);
        assert!(store.is_empty().await);
        assert_eq!(store.insights().await.success_rate, "N/A");
    }

    #[tokio::test]
    async fn test_stale_metrics_cache_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        {
            let store = HistoryStore::new(dir.path());
            let (plan, summary) = plan_and_summary(true, &[(Some("calculator"), StepStatus::Completed)]);
            store.record(&plan, &summary).await;
        }
        std::fs::write(
            dir.path().join("metrics.json"),
            r#"{"total_executions":99,"successful_executions":0,"failed_executions":99,"total_tools_used":0,"tool_usage":{}}"#,
        )
        .unwrap();

        let store = HistoryStore::new(dir.path());
        store.load().await.unwrap();
        let metrics = store.metrics().await;
        assert_eq!(metrics.total_executions, 1);
        assert_eq!(metrics.tool_usage.get("calculator"), Some(&1));
    }

    #[tokio::test]
    async fn test_incremental_matches_rebuild() {
        let store = HistoryStore::in_memory();
        let shapes: Vec<(bool, Vec<(Option<&str>, StepStatus)>)> = vec![
            (true, vec![(Some("calculator"), StepStatus::Completed)]),
            (false, vec![(Some("calculator"), StepStatus::Failed), (Some("database"), StepStatus::Pending)]),
            (true, vec![(None, StepStatus::Completed), (Some("text_analysis"), StepStatus::Completed)]),
            (true, vec![]),
        ];
        for (success, steps) in &shapes {
            let (plan, summary) = plan_and_summary(*success, steps);
            store.record(&plan, &summary).await;
            let rebuilt = PerformanceMetrics::rebuild(&store.records().await);
            assert_eq!(store.metrics().await, rebuilt);
        }
    }

    #[tokio::test]
    async fn test_persistence_fault_degrades_gracefully() {
        let dir = TempDir::new().unwrap();
        // 存储路径被一个普通文件占用，create_dir_all 会失败
        let blocked = dir.path().join("occupied");
        std::fs::write(&blocked, "not a directory").unwrap();
        let store = HistoryStore::new(&blocked);
        let (plan, summary) = plan_and_summary(true, &[(Some("calculator"), StepStatus::Completed)]);

        store.record(&plan, &summary).await;

        assert_eq!(store.len().await, 1);
        assert!(store.is_dirty().await);
        assert!(matches!(store.flush().await, Err(OrchestratorError::Persistence(_))));

        // 障碍移除后，下一次写入补齐全部记录
        std::fs::remove_file(&blocked).unwrap();
        store.record(&plan, &summary).await;
        assert!(!store.is_dirty().await);
        let reloaded = HistoryStore::new(&blocked);
        assert_eq!(reloaded.load().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(HistoryStore::new(dir.path()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let (plan, summary) =
                    plan_and_summary(i % 2 == 0, &[(Some("calculator"), StepStatus::Completed)]);
                store.record(&plan, &summary).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let metrics = store.metrics().await;
        assert_eq!(metrics.total_executions, 8);
        assert_eq!(metrics.successful_executions, 4);
        let reloaded = HistoryStore::new(dir.path());
        assert_eq!(reloaded.load().await.unwrap(), 8);
    }
}
