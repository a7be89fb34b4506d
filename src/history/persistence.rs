//! 历史持久化
//!
//! 目录下两个 JSON 文件：execution_log.json（记录数组）与 metrics.json（聚合指标缓存）。
//! 文件不存在时视为空；写入先落临时文件再 rename，避免中途失败留下半截文件。

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::OrchestratorError;
use crate::history::{ExecutionRecord, PerformanceMetrics};

pub const LOG_FILE: &str = "execution_log.json";
pub const METRICS_FILE: &str = "metrics.json";

#[derive(Debug, Clone)]
pub struct HistoryPersistence {
    dir: PathBuf,
}

impl HistoryPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    /// 加载执行日志；文件不存在时返回空 Vec
    pub fn load_log(&self) -> Result<Vec<ExecutionRecord>, OrchestratorError> {
        Ok(read_json(&self.log_path())?.unwrap_or_default())
    }

    /// 加载指标缓存；文件不存在时返回 None
    pub fn load_metrics(&self) -> Result<Option<PerformanceMetrics>, OrchestratorError> {
        read_json(&self.metrics_path())
    }

    pub fn save(
        &self,
        log: &[ExecutionRecord],
        metrics: &PerformanceMetrics,
    ) -> Result<(), OrchestratorError> {
        std::fs::create_dir_all(&self.dir)?;
        write_json(&self.log_path(), log)?;
        write_json(&self.metrics_path(), metrics)?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, OrchestratorError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OrchestratorError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
