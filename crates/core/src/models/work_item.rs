use chrono::{DateTime, Utc};
use orchestrator_errors::{ErrorCategory, OrchestratorError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::AnalysisReport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkItemStatus::Succeeded | WorkItemStatus::Failed | WorkItemStatus::Cancelled
        )
    }

    /// 状态机允许的转换，终态之后不再变化，也不会回到 pending
    pub fn can_transition_to(&self, next: WorkItemStatus) -> bool {
        use WorkItemStatus::*;
        matches!(
            (self, next),
            (Pending, Running | Failed | Cancelled)
                | (Running, Retrying | Succeeded | Failed | Cancelled)
                | (Retrying, Running | Failed | Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Running => "running",
            WorkItemStatus::Retrying => "retrying",
            WorkItemStatus::Succeeded => "succeeded",
            WorkItemStatus::Failed => "failed",
            WorkItemStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作项失败时记录的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&OrchestratorError> for ItemError {
    fn from(err: &OrchestratorError) -> Self {
        Self {
            category: err.category().unwrap_or(ErrorCategory::Internal),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: Uuid,
    /// 在提交顺序中的位置
    pub index: usize,
    pub file_path: String,
    pub agent_key: String,
    pub status: WorkItemStatus,
    pub attempt_count: u32,
    pub last_error: Option<ItemError>,
    pub result: Option<AnalysisReport>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(job_id: Uuid, index: usize, file_path: String, agent_key: String) -> Self {
        Self {
            job_id,
            index,
            file_path,
            agent_key,
            status: WorkItemStatus::Pending,
            attempt_count: 0,
            last_error: None,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn item_ref(&self) -> WorkItemRef {
        WorkItemRef {
            index: self.index,
            file_path: self.file_path.clone(),
            agent_key: self.agent_key.clone(),
        }
    }

    pub fn outcome(&self) -> ItemOutcome {
        match self.status {
            WorkItemStatus::Succeeded => match &self.result {
                Some(report) => ItemOutcome::Succeeded {
                    report: report.clone(),
                },
                None => ItemOutcome::Failed {
                    error: ItemError {
                        category: ErrorCategory::Internal,
                        message: "成功状态缺少结果".to_string(),
                    },
                },
            },
            WorkItemStatus::Failed => ItemOutcome::Failed {
                error: self.last_error.clone().unwrap_or(ItemError {
                    category: ErrorCategory::Internal,
                    message: "未记录失败原因".to_string(),
                }),
            },
            WorkItemStatus::Cancelled => ItemOutcome::Cancelled,
            WorkItemStatus::Pending => ItemOutcome::Pending,
            WorkItemStatus::Running | WorkItemStatus::Retrying => ItemOutcome::Running {
                attempt_count: self.attempt_count,
            },
        }
    }
}

/// 日志条目中引用的工作项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRef {
    pub index: usize,
    pub file_path: String,
    pub agent_key: String,
}

impl std::fmt::Display for WorkItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} [{}]", self.index, self.file_path, self.agent_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded { report: AnalysisReport },
    Failed { error: ItemError },
    Cancelled,
    Pending,
    Running { attempt_count: u32 },
}

/// get_results 返回的单项结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    pub file_path: String,
    pub agent_key: String,
    pub attempt_count: u32,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl From<&WorkItem> for ItemResult {
    fn from(item: &WorkItem) -> Self {
        Self {
            index: item.index,
            file_path: item.file_path.clone(),
            agent_key: item.agent_key.clone(),
            attempt_count: item.attempt_count,
            outcome: item.outcome(),
        }
    }
}
