use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::{CancellationController, ProgressTracker};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use tokio::sync::{watch, RwLock};
use tracing::debug;
use uuid::Uuid;

/// 会话内一个作业的全部运行时句柄
pub struct JobHandle {
    pub tracker: Arc<ProgressTracker>,
    pub cancellation: CancellationController,
    workers_done: watch::Receiver<bool>,
}

impl JobHandle {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        cancellation: CancellationController,
        workers_done: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tracker,
            cancellation,
            workers_done,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.tracker.job_id()
    }

    /// 等待所有工作单元退出
    pub async fn wait_workers(&self) -> OrchestratorResult<()> {
        let mut done = self.workers_done.clone();
        done.wait_for(|finished| *finished)
            .await
            .map(|_| ())
            .map_err(|_| OrchestratorError::Internal("工作单元监督任务已丢失".to_string()))
    }
}

/// 作业注册表，生命周期由控制器显式管理
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新作业，同时清除已经结束的旧作业
    pub async fn insert(&self, handle: JobHandle) -> Arc<JobHandle> {
        let handle = Arc::new(handle);
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, existing| !existing.tracker.is_finished());
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!("清除 {} 个已结束的作业", evicted);
        }
        jobs.insert(handle.job_id(), Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, job_id: Uuid) -> OrchestratorResult<Arc<JobHandle>> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::job_not_found(job_id))
    }

    /// 按创建时间排序
    pub async fn list(&self) -> Vec<Arc<JobHandle>> {
        let mut handles: Vec<Arc<JobHandle>> = self.jobs.read().await.values().cloned().collect();
        handles.sort_by_key(|h| h.tracker.job().created_at);
        handles
    }

    /// 取出全部作业并清空注册表
    pub async fn drain(&self) -> Vec<Arc<JobHandle>> {
        self.jobs.write().await.drain().map(|(_, h)| h).collect()
    }
}
