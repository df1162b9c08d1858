use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::{
    AgentDescriptor, ProgressTracker, SnapshotStore, TerminalTransition,
};
use orchestrator_errors::OrchestratorError;
use orchestrator_worker::ItemRunner;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 按并发上限执行一个作业的全部工作项
pub struct WorkerPool {
    runner: Arc<ItemRunner>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    max_concurrency: usize,
}

impl WorkerPool {
    pub fn new(
        runner: Arc<ItemRunner>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            runner,
            snapshots,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 在后台启动作业，返回的接收端在所有工作单元退出后变为 true
    pub fn spawn(
        &self,
        tracker: Arc<ProgressTracker>,
        agents: Arc<HashMap<String, AgentDescriptor>>,
        token: CancellationToken,
    ) -> watch::Receiver<bool> {
        let (done_tx, done_rx) = watch::channel(false);
        let runner = Arc::clone(&self.runner);
        let snapshots = self.snapshots.clone();
        let worker_count = self.max_concurrency.min(tracker.progress().total).max(1);

        tokio::spawn(async move {
            let job_id = tracker.job_id();
            info!(job_id = %job_id, workers = worker_count, "作业开始执行");

            let mut workers = JoinSet::new();
            for worker_id in 0..worker_count {
                workers.spawn(worker_loop(
                    worker_id,
                    Arc::clone(&runner),
                    snapshots.clone(),
                    Arc::clone(&tracker),
                    Arc::clone(&agents),
                    token.clone(),
                ));
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(job_id = %job_id, "工作单元异常退出: {}", e);
                }
            }

            if tracker.is_finished() {
                info!(job_id = %job_id, status = %tracker.status(), "作业执行完毕");
            } else {
                error!(job_id = %job_id, progress = ?tracker.progress(), "所有工作单元已退出但作业未结束");
            }
            done_tx.send_replace(true);
        });

        done_rx
    }
}

/// 单个工作单元：完成当前工作项之后才接纳下一个
async fn worker_loop(
    worker_id: usize,
    runner: Arc<ItemRunner>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    tracker: Arc<ProgressTracker>,
    agents: Arc<HashMap<String, AgentDescriptor>>,
    token: CancellationToken,
) {
    let job_id = tracker.job_id();
    while let Some(item) = tracker.admit_next(&token) {
        debug!(job_id = %job_id, worker_id, index = item.index, "工作单元接纳工作项");

        let outcome = match agents.get(&item.agent_key) {
            Some(agent) => runner.run(&tracker, &item, agent, &token).await,
            None => Err(OrchestratorError::Internal(format!(
                "代理 {} 没有描述信息",
                item.agent_key
            ))),
        };

        match outcome {
            Ok(transition) => persist_snapshot(snapshots.as_deref(), transition).await,
            Err(e) => {
                error!(job_id = %job_id, index = item.index, "工作项执行出错: {}", e);
                match tracker.complete_failure(item.index, "internal", &e) {
                    Ok(transition) => persist_snapshot(snapshots.as_deref(), transition).await,
                    Err(e) => error!(job_id = %job_id, index = item.index, "无法标记工作项失败: {}", e),
                }
            }
        }
    }
    debug!(job_id = %job_id, worker_id, "工作单元退出");
}

/// 尽力写入快照，失败只记录日志
pub async fn persist_snapshot(store: Option<&dyn SnapshotStore>, transition: TerminalTransition) {
    let Some(store) = store else {
        return;
    };
    let job_id = transition.snapshot.job_id;
    if let Err(e) = store.save(&transition.snapshot).await {
        warn!(job_id = %job_id, "快照写入失败: {}", e);
    }
}
