use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{progress::ProgressSnapshot, work_item::WorkItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    /// 作业状态由工作项聚合结果决定，取消标志优先
    pub fn from_aggregate(progress: &ProgressSnapshot, cancel_requested: bool) -> Self {
        if !progress.is_complete() {
            JobStatus::Running
        } else if cancel_requested {
            JobStatus::Cancelled
        } else if progress.failed > 0 {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<String>,
    pub agents: Vec<String>,
    pub items: Vec<WorkItem>,
    pub progress: ProgressSnapshot,
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(id: Uuid, files: Vec<String>, agents: Vec<String>, items: Vec<WorkItem>) -> Self {
        let progress = ProgressSnapshot::new(items.len());
        Self {
            id,
            status: JobStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            files,
            agents,
            items,
            progress,
            cancel_requested: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
            finished_at: self.finished_at,
            file_count: self.files.len(),
            agent_count: self.agents.len(),
            progress: self.progress,
            cancel_requested: self.cancel_requested,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub agent_count: usize,
    pub progress: ProgressSnapshot,
    pub cancel_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItemStatus::*;

    #[test]
    fn test_status_from_aggregate() {
        let mut progress = ProgressSnapshot::new(2);
        assert_eq!(JobStatus::from_aggregate(&progress, false), JobStatus::Running);
        assert_eq!(JobStatus::from_aggregate(&progress, true), JobStatus::Running);

        progress.apply(Pending, Succeeded);
        progress.apply(Pending, Failed);
        assert_eq!(
            JobStatus::from_aggregate(&progress, false),
            JobStatus::CompletedWithErrors
        );
        assert_eq!(JobStatus::from_aggregate(&progress, true), JobStatus::Cancelled);

        let mut progress = ProgressSnapshot::new(1);
        progress.apply(Pending, Succeeded);
        assert_eq!(JobStatus::from_aggregate(&progress, false), JobStatus::Completed);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&JobStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
    }
}
