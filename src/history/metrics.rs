//! 聚合指标
//!
//! 每条记录到来时增量更新；同时提供从完整日志重建的版本，二者结果必须一致。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::history::ExecutionRecord;

/// 最常用工具的展示数量
pub const TOP_TOOLS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_tools_used: u64,
    pub tool_usage: BTreeMap<String, u64>,
}

impl PerformanceMetrics {
    /// 增量更新：只触及本条记录涉及的工具
    pub fn apply(&mut self, record: &ExecutionRecord) {
        self.total_executions += 1;
        if record.success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }

        for tool in record.result.results.iter().filter_map(|o| o.invoked_tool()) {
            self.total_tools_used += 1;
            *self.tool_usage.entry(tool.to_string()).or_insert(0) += 1;
        }
    }

    pub fn rebuild<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let mut metrics = Self::default();
        for record in records {
            metrics.apply(record);
        }
        metrics
    }

    pub fn insights(&self) -> Insights {
        let success_rate = if self.total_executions == 0 {
            "N/A".to_string()
        } else {
            format!(
                "{:.1}%",
                self.successful_executions as f64 / self.total_executions as f64 * 100.0
            )
        };

        let mut ranked: Vec<(&String, &u64)> = self.tool_usage.iter().collect();
        // 次数降序，同次数按名称升序
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        Insights {
            total_executions: self.total_executions,
            success_rate,
            successful: self.successful_executions,
            failed: self.failed_executions,
            total_tools_used: self.total_tools_used,
            most_used_tools: ranked
                .into_iter()
                .take(TOP_TOOLS)
                .map(|(tool, count)| ToolUsageCount {
                    tool: tool.clone(),
                    count: *count,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsageCount {
    pub tool: String,
    pub count: u64,
}

/// 对外展示的历史洞察
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub total_executions: u64,
    /// 一位小数的百分比；无执行记录时为 "N/A"
    pub success_rate: String,
    pub successful: u64,
    pub failed: u64,
    pub total_tools_used: u64,
    pub most_used_tools: Vec<ToolUsageCount>,
}
