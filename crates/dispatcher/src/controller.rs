use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::{
    AgentDescriptor, AgentRegistry, CancelOutcome, CancellationController, ItemResult,
    JobSnapshot, JobStatus, JobSummary, LogEntry, ProgressSnapshot, ProgressTracker,
    SnapshotStore,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use orchestrator_worker::ItemRunner;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::job_store::{JobHandle, JobStore};
use crate::scheduler::{persist_snapshot, WorkerPool};
use crate::task_graph::TaskGraphBuilder;

/// 取消请求的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancelAcknowledgement {
    /// 首次取消，`drained` 个待执行工作项已直接取消
    Requested { drained: usize },
    AlreadyRequested,
    AlreadyFinished { status: JobStatus },
}

/// 面向使用方的作业控制接口
pub struct JobController {
    registry: AgentRegistry,
    store: JobStore,
    pool: WorkerPool,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    max_attempts: u32,
}

impl JobController {
    pub fn new(
        registry: AgentRegistry,
        runner: ItemRunner,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        max_concurrency: usize,
    ) -> Self {
        let max_attempts = runner.executor().policy().max_attempts;
        let pool = WorkerPool::new(Arc::new(runner), snapshots.clone(), max_concurrency);
        Self {
            registry,
            store: JobStore::new(),
            pool,
            snapshots,
            max_attempts,
        }
    }

    /// 提交批量分析请求，校验失败时不会创建作业
    pub async fn submit_job(
        &self,
        files: Vec<String>,
        agents: Vec<String>,
    ) -> OrchestratorResult<Uuid> {
        let graph = TaskGraphBuilder::new(&self.registry).build(&files, &agents)?;
        let job_id = graph.job.id;
        let total = graph.job.items.len();
        let file_count = graph.job.files.len();

        let tracker = Arc::new(ProgressTracker::new(graph.job, self.max_attempts));
        let cancellation = CancellationController::new();
        self.save_snapshot(tracker.snapshot()).await;

        let workers_done = self
            .pool
            .spawn(Arc::clone(&tracker), graph.agents, cancellation.token());
        self.store
            .insert(JobHandle::new(tracker, cancellation, workers_done))
            .await;

        info!(
            job_id = %job_id,
            files = file_count,
            agents = agents.len(),
            items = total,
            "作业已提交"
        );
        Ok(job_id)
    }

    pub async fn get_progress(&self, job_id: Uuid) -> OrchestratorResult<ProgressSnapshot> {
        Ok(self.store.get(job_id).await?.tracker.progress())
    }

    /// 返回序号大于 `since_sequence` 的日志，传 0 获取全部
    pub async fn get_logs(
        &self,
        job_id: Uuid,
        since_sequence: u64,
    ) -> OrchestratorResult<Vec<LogEntry>> {
        Ok(self.store.get(job_id).await?.tracker.logs_since(since_sequence))
    }

    /// 按提交顺序返回每个工作项的结果，未结束的工作项报告为 pending/running
    pub async fn get_results(&self, job_id: Uuid) -> OrchestratorResult<Vec<ItemResult>> {
        Ok(self.store.get(job_id).await?.tracker.results())
    }

    /// 取消作业，可重复调用
    pub async fn cancel_job(&self, job_id: Uuid) -> OrchestratorResult<CancelAcknowledgement> {
        let handle = self.store.get(job_id).await?;
        let ack = self.cancel_handle(&handle).await;
        info!(job_id = %job_id, ack = ?ack, "处理取消请求");
        Ok(ack)
    }

    async fn cancel_handle(&self, handle: &JobHandle) -> CancelAcknowledgement {
        match handle.tracker.cancel_pending() {
            CancelOutcome::Cancelled {
                drained,
                transition,
            } => {
                // 待执行队列已清空后再唤醒退避中的工作项
                handle.cancellation.cancel();
                if let Some(transition) = transition {
                    persist_snapshot(self.snapshots.as_deref(), transition).await;
                }
                CancelAcknowledgement::Requested { drained }
            }
            CancelOutcome::AlreadyRequested => {
                handle.cancellation.cancel();
                CancelAcknowledgement::AlreadyRequested
            }
            CancelOutcome::AlreadyFinished(status) => {
                CancelAcknowledgement::AlreadyFinished { status }
            }
        }
    }

    pub async fn get_job(&self, job_id: Uuid) -> OrchestratorResult<JobSummary> {
        Ok(self.store.get(job_id).await?.tracker.job().summary())
    }

    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        self.store
            .list()
            .await
            .iter()
            .map(|h| h.tracker.job().summary())
            .collect()
    }

    /// 订阅作业状态，作业结束时收到通知
    pub async fn subscribe(&self, job_id: Uuid) -> OrchestratorResult<watch::Receiver<JobStatus>> {
        Ok(self.store.get(job_id).await?.tracker.subscribe())
    }

    /// 等待作业结束且所有快照写入完成
    pub async fn wait_for_completion(&self, job_id: Uuid) -> OrchestratorResult<JobStatus> {
        let handle = self.store.get(job_id).await?;
        handle.wait_workers().await?;
        Ok(handle.tracker.status())
    }

    /// 取消所有运行中的作业并清空注册表，返回清除的作业数
    pub async fn reset(&self) -> usize {
        let handles = self.store.drain().await;
        for handle in &handles {
            if !handle.tracker.is_finished() {
                self.cancel_handle(handle).await;
            }
        }
        info!(jobs = handles.len(), "作业注册表已重置");
        handles.len()
    }

    pub fn agents(&self) -> &[AgentDescriptor] {
        self.registry.descriptors()
    }

    /// 会话内的作业直接读取内存状态，否则回退到持久化快照
    pub async fn last_known_state(&self, job_id: Uuid) -> OrchestratorResult<JobSnapshot> {
        if let Ok(handle) = self.store.get(job_id).await {
            return Ok(handle.tracker.snapshot());
        }
        let Some(store) = &self.snapshots else {
            return Err(OrchestratorError::job_not_found(job_id));
        };
        match store.load(job_id).await? {
            Some(snapshot) => {
                debug!(job_id = %job_id, "从快照恢复作业状态");
                Ok(snapshot)
            }
            None => Err(OrchestratorError::job_not_found(job_id)),
        }
    }

    /// 全部持久化快照，未配置快照存储时为空
    pub async fn persisted_snapshots(&self) -> OrchestratorResult<HashMap<Uuid, JobSnapshot>> {
        match &self.snapshots {
            Some(store) => store.load_all().await,
            None => Ok(HashMap::new()),
        }
    }

    async fn save_snapshot(&self, snapshot: JobSnapshot) {
        if let Some(store) = &self.snapshots {
            if let Err(e) = store.save(&snapshot).await {
                warn!(job_id = %snapshot.job_id, "快照写入失败: {}", e);
            }
        }
    }
}
