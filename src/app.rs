use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator_config::AppConfig;
use orchestrator_core::{
    AgentRegistry, AnalysisProvider, FileAccess, JobSnapshot, RetryPolicy, SnapshotStore,
};
use orchestrator_dispatcher::JobController;
use orchestrator_infrastructure::{HttpAnalysisProvider, JsonFileSnapshotStore, LocalFileAccess};
use orchestrator_worker::{ItemRunner, RetryExecutor};
use tracing::{debug, info};
use uuid::Uuid;

use crate::report::{JobReport, OutputFormat};
use crate::shutdown::spawn_cancel_on_signal;

/// 进度轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 主应用程序
pub struct Application {
    config: AppConfig,
    controller: Arc<JobController>,
}

impl Application {
    /// 按配置装配生产实现
    pub fn new(config: AppConfig) -> Result<Self> {
        let file_access = LocalFileAccess::new(&config.files).context("初始化文件访问失败")?;
        let provider = HttpAnalysisProvider::from_config(&config.analysis);
        let snapshots: Option<Arc<dyn SnapshotStore>> = if config.snapshot.enabled {
            Some(Arc::new(JsonFileSnapshotStore::new(&config.snapshot.path)))
        } else {
            None
        };
        Ok(Self::with_components(
            config,
            Arc::new(provider),
            Arc::new(file_access),
            snapshots,
        ))
    }

    /// 使用给定的能力实现装配
    pub fn with_components(
        config: AppConfig,
        provider: Arc<dyn AnalysisProvider>,
        file_access: Arc<dyn FileAccess>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let policy = RetryPolicy::from(&config.retry);
        let timeout = Duration::from_secs(config.analysis.timeout_seconds);
        let executor = RetryExecutor::new(provider, policy, timeout);
        let runner = ItemRunner::new(file_access, executor);
        let controller = JobController::new(
            AgentRegistry::builtin(),
            runner,
            snapshots,
            config.scheduler.max_concurrency,
        );
        info!(
            max_concurrency = config.scheduler.max_concurrency,
            max_attempts = config.retry.max_attempts,
            "应用程序已初始化"
        );
        Self {
            config,
            controller: Arc::new(controller),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn controller(&self) -> Arc<JobController> {
        Arc::clone(&self.controller)
    }

    /// 提交作业并等待结束；文本模式下持续输出新日志与进度
    pub async fn run_job<W: Write>(
        &self,
        files: Vec<String>,
        agents: Vec<String>,
        format: OutputFormat,
        out: &mut W,
    ) -> Result<JobReport> {
        let job_id = self
            .controller
            .submit_job(files, agents)
            .await
            .context("提交作业失败")?;
        let signal_task = spawn_cancel_on_signal(self.controller(), job_id);

        let mut last_sequence = 0;
        let mut last_finished = None;
        let wait = self.controller.wait_for_completion(job_id);
        tokio::pin!(wait);

        let status = loop {
            tokio::select! {
                status = &mut wait => break status?,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if format == OutputFormat::Text {
                        last_sequence = self.stream_logs(job_id, last_sequence, out).await?;
                        let progress = self.controller.get_progress(job_id).await?;
                        if last_finished != Some(progress.finished()) {
                            last_finished = Some(progress.finished());
                            writeln!(
                                out,
                                "进度: {}/{} ({:.1}%)",
                                progress.finished(),
                                progress.total,
                                progress.percent_complete
                            )?;
                        }
                    }
                }
            }
        };
        signal_task.abort();

        if format == OutputFormat::Text {
            self.stream_logs(job_id, last_sequence, out).await?;
        }
        debug!(job_id = %job_id, status = %status, "作业结束");

        Ok(JobReport {
            job: self.controller.get_job(job_id).await?,
            results: self.controller.get_results(job_id).await?,
        })
    }

    async fn stream_logs<W: Write>(&self, job_id: Uuid, since: u64, out: &mut W) -> Result<u64> {
        let entries = self.controller.get_logs(job_id, since).await?;
        let mut last = since;
        for entry in entries {
            writeln!(out, "{entry}")?;
            last = entry.sequence;
        }
        Ok(last)
    }

    /// 最后已知状态；未指定作业时返回全部持久化快照
    pub async fn snapshots(&self, job_id: Option<Uuid>) -> Result<Vec<JobSnapshot>> {
        match job_id {
            Some(job_id) => Ok(vec![self
                .controller
                .last_known_state(job_id)
                .await
                .with_context(|| format!("找不到作业 {job_id} 的快照"))?]),
            None => {
                let mut snapshots: Vec<JobSnapshot> = self
                    .controller
                    .persisted_snapshots()
                    .await?
                    .into_values()
                    .collect();
                snapshots.sort_by_key(|s| s.updated_at);
                Ok(snapshots)
            }
        }
    }
}
