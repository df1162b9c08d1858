use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::{Job, JobStatus, ProgressSnapshot, WorkItem},
    OrchestratorResult,
};

/// 持久化的作业快照，仅用于恢复最后已知状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub items: Vec<WorkItem>,
    pub progress: ProgressSnapshot,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            items: job.items.clone(),
            progress: job.progress,
            updated_at: Utc::now(),
        }
    }

    /// 快照版本：已进入终态的工作项数量，只增不减
    pub fn version(&self) -> usize {
        let finished = self.progress.finished();
        if self.status.is_terminal() {
            finished + 1
        } else {
            finished
        }
    }
}

/// 快照存储接口，写入失败不影响作业执行
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &JobSnapshot) -> OrchestratorResult<()>;

    async fn load(&self, job_id: Uuid) -> OrchestratorResult<Option<JobSnapshot>>;

    async fn load_all(&self) -> OrchestratorResult<HashMap<Uuid, JobSnapshot>>;
}
