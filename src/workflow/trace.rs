//! 调试轨迹：每执行一步追加一条记录，只用于观测，不参与控制流

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::state::TriggerType;
use crate::workflow::types::Node;

/// 单步记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    /// 记录时的 step_counter
    pub step: u32,
    pub node: Node,
    pub detail: String,
    pub next_step: Node,
    pub met_goal: Option<bool>,
    pub trigger_type: Option<TriggerType>,
    pub at: DateTime<Utc>,
}

/// 只追加的调试轨迹
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugTrace {
    entries: Vec<DebugEntry>,
}

impl DebugTrace {
    pub fn record(&mut self, entry: DebugEntry) {
        tracing::debug!(
            step = entry.step,
            node = %entry.node,
            next_step = %entry.next_step,
            detail = %entry.detail,
            "workflow step"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    /// 最近一条记录（引擎在预算耗尽时补充终止信息）
    pub fn last_mut(&mut self) -> Option<&mut DebugEntry> {
        self.entries.last_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 人类可读的多行摘要（CLI 调试输出）
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "[{}] {} -> {} | {} (met_goal={:?}, trigger={})",
                    e.step,
                    e.node,
                    e.next_step,
                    e.detail,
                    e.met_goal,
                    e.trigger_type.map(|t| t.as_str()).unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
