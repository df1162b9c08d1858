use serde::{Deserialize, Serialize};

use super::work_item::WorkItemStatus;

/// 作业进度快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub pending: usize,
    /// 包含正在重试等待中的工作项
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub percent_complete: f64,
}

impl ProgressSnapshot {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            pending: total,
            ..Self::default()
        }
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.finished() == self.total
    }

    /// 一次状态转换对计数器的增量更新
    pub fn apply(&mut self, from: WorkItemStatus, to: WorkItemStatus) {
        if Self::bucket(from) == Self::bucket(to) {
            return;
        }
        let from_counter = self.counter_mut(from);
        *from_counter = from_counter.saturating_sub(1);
        *self.counter_mut(to) += 1;
        self.percent_complete = if self.total == 0 {
            0.0
        } else {
            self.finished() as f64 / self.total as f64 * 100.0
        };
    }

    fn bucket(status: WorkItemStatus) -> u8 {
        match status {
            WorkItemStatus::Pending => 0,
            WorkItemStatus::Running | WorkItemStatus::Retrying => 1,
            WorkItemStatus::Succeeded => 2,
            WorkItemStatus::Failed => 3,
            WorkItemStatus::Cancelled => 4,
        }
    }

    fn counter_mut(&mut self, status: WorkItemStatus) -> &mut usize {
        match status {
            WorkItemStatus::Pending => &mut self.pending,
            WorkItemStatus::Running | WorkItemStatus::Retrying => &mut self.running,
            WorkItemStatus::Succeeded => &mut self.succeeded,
            WorkItemStatus::Failed => &mut self.failed,
            WorkItemStatus::Cancelled => &mut self.cancelled,
        }
    }
}
