//! 作业进度跟踪
//!
//! 作业记录、工作项集合与待执行队列是执行期间唯一的可变共享状态，全部由
//! [`ProgressTracker`] 持有并在同一把锁下修改。每次状态转换都是一次原子更新：
//! 工作项状态、作业计数器、日志序号以及作业终态判定在同一临界区内完成。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        AnalysisReport, ItemError, ItemResult, Job, JobStatus, LogEntry, LogLevel,
        ProgressSnapshot, WorkItem, WorkItemStatus,
    },
    traits::JobSnapshot,
    OrchestratorError, OrchestratorResult,
};

/// 被调度器接纳、即将执行的工作项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedItem {
    pub index: usize,
    pub file_path: String,
    pub agent_key: String,
}

/// 一次终态转换的结果，用于写入快照
#[derive(Debug, Clone)]
pub struct TerminalTransition {
    pub snapshot: JobSnapshot,
    /// 本次转换使作业结束时为 Some
    pub job_finished: Option<JobStatus>,
}

/// 开始尝试的结果
#[derive(Debug, Clone)]
pub enum AttemptStart {
    /// 新尝试的序号（从1开始）
    Started(u32),
    /// 作业已请求取消，工作项在同一临界区内转为 cancelled
    Cancelled(TerminalTransition),
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// 首次取消，`drained` 个待执行工作项被直接取消
    Cancelled {
        drained: usize,
        transition: Option<TerminalTransition>,
    },
    AlreadyRequested,
    AlreadyFinished(JobStatus),
}

struct TrackerState {
    job: Job,
    queue: VecDeque<usize>,
    logs: Vec<LogEntry>,
    next_sequence: u64,
}

impl TrackerState {
    fn item(&self, index: usize) -> OrchestratorResult<&WorkItem> {
        self.job
            .items
            .get(index)
            .ok_or_else(|| OrchestratorError::Internal(format!("工作项索引越界: {index}")))
    }

    fn item_mut(&mut self, index: usize) -> OrchestratorResult<&mut WorkItem> {
        self.job
            .items
            .get_mut(index)
            .ok_or_else(|| OrchestratorError::Internal(format!("工作项索引越界: {index}")))
    }

    fn append_log(&mut self, level: LogLevel, index: Option<usize>, message: String) {
        let item = index.and_then(|i| self.job.items.get(i)).map(WorkItem::item_ref);
        let label = item.as_ref().map(|r| r.to_string()).unwrap_or_default();
        let job_id = self.job.id;

        match level {
            LogLevel::Debug => debug!(job_id = %job_id, item = %label, "{}", message),
            LogLevel::Info => info!(job_id = %job_id, item = %label, "{}", message),
            LogLevel::Warn => warn!(job_id = %job_id, item = %label, "{}", message),
            LogLevel::Error => error!(job_id = %job_id, item = %label, "{}", message),
        }

        self.logs.push(LogEntry {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            job_id,
            item,
            level,
            message,
        });
        self.next_sequence += 1;
    }

    fn transition(&mut self, index: usize, to: WorkItemStatus) -> OrchestratorResult<()> {
        let item = self.item_mut(index)?;
        let from = item.status;
        if !from.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        item.status = to;
        if to == WorkItemStatus::Running && item.started_at.is_none() {
            item.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            item.finished_at = Some(Utc::now());
            metrics::counter!("orchestrator_items_finished_total", "status" => to.as_str())
                .increment(1);
        }

        self.job.progress.apply(from, to);
        Ok(())
    }

    fn cancel_item(&mut self, index: usize, reason: &str) -> OrchestratorResult<()> {
        self.transition(index, WorkItemStatus::Cancelled)?;
        self.append_log(LogLevel::Info, Some(index), format!("工作项已取消: {reason}"));
        Ok(())
    }

    fn finish_if_complete(&mut self) -> Option<JobStatus> {
        if self.job.status.is_terminal() {
            return None;
        }
        let status = JobStatus::from_aggregate(&self.job.progress, self.job.cancel_requested);
        if !status.is_terminal() {
            return None;
        }

        self.job.status = status;
        self.job.finished_at = Some(Utc::now());
        let progress = self.job.progress;
        let level = match status {
            JobStatus::Completed => LogLevel::Info,
            _ => LogLevel::Warn,
        };
        self.append_log(
            level,
            None,
            format!(
                "作业结束: status={}, 成功 {}, 失败 {}, 取消 {}, 共 {}",
                status,
                progress.succeeded,
                progress.failed,
                progress.cancelled,
                progress.total
            ),
        );
        Some(status)
    }
}

/// 作业级进度聚合器，所有状态修改的唯一入口
pub struct ProgressTracker {
    job_id: Uuid,
    max_attempts: u32,
    state: Mutex<TrackerState>,
    status_tx: watch::Sender<JobStatus>,
}

impl ProgressTracker {
    /// 以提交顺序建立待执行队列
    pub fn new(job: Job, max_attempts: u32) -> Self {
        let job_id = job.id;
        let queue = (0..job.items.len()).collect();
        let (status_tx, _) = watch::channel(job.status);
        let mut state = TrackerState {
            job,
            queue,
            logs: Vec::new(),
            next_sequence: 1,
        };
        let message = format!(
            "作业已创建: {} 个文件 × {} 个代理 = {} 个工作项",
            state.job.files.len(),
            state.job.agents.len(),
            state.job.items.len()
        );
        state.append_log(LogLevel::Info, None, message);

        Self {
            job_id,
            max_attempts,
            state: Mutex::new(state),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 原子地取出下一个待执行工作项，作业已取消时返回 None
    pub fn admit_next(&self, token: &CancellationToken) -> Option<AdmittedItem> {
        let mut state = self.lock();
        loop {
            if token.is_cancelled() || state.job.cancel_requested || state.job.is_finished() {
                return None;
            }
            let index = state.queue.pop_front()?;
            match state.transition(index, WorkItemStatus::Running) {
                Ok(()) => {
                    let item = state.job.items[index].clone();
                    state.append_log(LogLevel::Debug, Some(index), "开始处理工作项".to_string());
                    return Some(AdmittedItem {
                        index,
                        file_path: item.file_path,
                        agent_key: item.agent_key,
                    });
                }
                Err(e) => {
                    state.append_log(LogLevel::Error, Some(index), format!("无法接纳工作项: {e}"));
                }
            }
        }
    }

    /// 开始一次新的尝试
    ///
    /// 取消标志与尝试计数在同一把锁下检查，取消请求之后不会再有新的尝试开始。
    pub fn start_attempt(&self, index: usize) -> OrchestratorResult<AttemptStart> {
        let mut state = self.lock();
        if state.job.cancel_requested {
            state.cancel_item(index, "作业已取消，不再发起新的尝试")?;
            return Ok(AttemptStart::Cancelled(self.terminal_transition(&mut state)));
        }

        let max_attempts = self.max_attempts;
        let (status, attempt_count) = {
            let item = state.item(index)?;
            (item.status, item.attempt_count)
        };
        if attempt_count >= max_attempts {
            return Err(OrchestratorError::Internal(format!(
                "工作项 #{index} 已达到最大尝试次数 {max_attempts}"
            )));
        }
        match status {
            WorkItemStatus::Running => {}
            WorkItemStatus::Retrying => state.transition(index, WorkItemStatus::Running)?,
            other => {
                return Err(OrchestratorError::InvalidTransition {
                    from: other.to_string(),
                    to: WorkItemStatus::Running.to_string(),
                })
            }
        }

        let item = state.item_mut(index)?;
        item.attempt_count += 1;
        let attempt = item.attempt_count;
        state.append_log(
            LogLevel::Debug,
            Some(index),
            format!("第 {attempt}/{max_attempts} 次尝试"),
        );
        Ok(AttemptStart::Started(attempt))
    }

    /// 记录一次可重试的失败，工作项进入 retrying
    pub fn mark_retrying(
        &self,
        index: usize,
        attempt: u32,
        classification: &str,
        error: &OrchestratorError,
        delay: Duration,
    ) -> OrchestratorResult<()> {
        let mut state = self.lock();
        state.transition(index, WorkItemStatus::Retrying)?;
        state.item_mut(index)?.last_error = Some(ItemError::from(error));
        state.append_log(
            LogLevel::Warn,
            Some(index),
            format!(
                "第 {attempt} 次尝试失败 [{classification}]，{}ms 后重试: {error}",
                delay.as_millis()
            ),
        );
        Ok(())
    }

    /// 作业已请求取消时，执行中的工作项无论结果如何都以 cancelled 结束
    pub fn complete_success(
        &self,
        index: usize,
        attempt: u32,
        report: AnalysisReport,
    ) -> OrchestratorResult<TerminalTransition> {
        let mut state = self.lock();
        if state.job.cancel_requested {
            state.cancel_item(index, &format!("作业已取消，丢弃第 {attempt} 次尝试的成功结果"))?;
            return Ok(self.terminal_transition(&mut state));
        }
        state.transition(index, WorkItemStatus::Succeeded)?;
        let item = state.item_mut(index)?;
        item.result = Some(report);
        item.last_error = None;
        state.append_log(
            LogLevel::Info,
            Some(index),
            format!("第 {attempt} 次尝试成功，结果已通过结构校验"),
        );
        Ok(self.terminal_transition(&mut state))
    }

    /// 工作项终态失败；`classification` 为空表示未进行任何尝试
    pub fn complete_failure(
        &self,
        index: usize,
        classification: &str,
        error: &OrchestratorError,
    ) -> OrchestratorResult<TerminalTransition> {
        let mut state = self.lock();
        if state.job.cancel_requested {
            state.cancel_item(index, &format!("作业已取消，丢弃失败结果 [{classification}]: {error}"))?;
            return Ok(self.terminal_transition(&mut state));
        }
        state.transition(index, WorkItemStatus::Failed)?;
        let item = state.item_mut(index)?;
        item.last_error = Some(ItemError::from(error));
        let attempt = item.attempt_count;
        let level = match error {
            OrchestratorError::PermanentCall { .. } => LogLevel::Error,
            _ => LogLevel::Warn,
        };
        state.append_log(
            level,
            Some(index),
            format!("工作项失败 [{classification}] (共尝试 {attempt} 次): {error}"),
        );
        Ok(self.terminal_transition(&mut state))
    }

    pub fn complete_cancelled(
        &self,
        index: usize,
        reason: &str,
    ) -> OrchestratorResult<TerminalTransition> {
        let mut state = self.lock();
        state.cancel_item(index, reason)?;
        Ok(self.terminal_transition(&mut state))
    }

    /// 标记作业取消，并把所有待执行工作项直接转为 cancelled
    pub fn cancel_pending(&self) -> CancelOutcome {
        let mut state = self.lock();
        if state.job.is_finished() {
            return CancelOutcome::AlreadyFinished(state.job.status);
        }
        if state.job.cancel_requested {
            return CancelOutcome::AlreadyRequested;
        }

        state.job.cancel_requested = true;
        let pending: Vec<usize> = state.queue.drain(..).collect();
        let drained = pending.len();
        for index in pending {
            if let Err(e) = state.transition(index, WorkItemStatus::Cancelled) {
                state.append_log(LogLevel::Error, Some(index), format!("取消工作项失败: {e}"));
            }
        }
        state.append_log(
            LogLevel::Warn,
            None,
            format!("收到取消请求: {drained} 个待执行工作项已取消，执行中的工作项将在当前尝试结束后停止"),
        );

        let transition = (drained > 0 || state.job.progress.is_complete())
            .then(|| self.terminal_transition(&mut state));
        CancelOutcome::Cancelled {
            drained,
            transition,
        }
    }

    fn terminal_transition(&self, state: &mut TrackerState) -> TerminalTransition {
        let job_finished = state.finish_if_complete();
        if let Some(status) = job_finished {
            self.status_tx.send_replace(status);
        }
        TerminalTransition {
            snapshot: JobSnapshot::from_job(&state.job),
            job_finished,
        }
    }

    /// 追加一条作业日志
    pub fn log(&self, level: LogLevel, index: Option<usize>, message: impl Into<String>) {
        self.lock().append_log(level, index, message.into());
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.lock().job.progress
    }

    pub fn status(&self) -> JobStatus {
        self.lock().job.status
    }

    pub fn is_finished(&self) -> bool {
        self.lock().job.is_finished()
    }

    /// 作业是否已请求取消；先于取消令牌被设置
    pub fn cancel_requested(&self) -> bool {
        self.lock().job.cancel_requested
    }

    pub fn job(&self) -> Job {
        self.lock().job.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot::from_job(&self.lock().job)
    }

    pub fn results(&self) -> Vec<ItemResult> {
        self.lock().job.items.iter().map(ItemResult::from).collect()
    }

    /// 返回序号大于 `since_sequence` 的全部日志
    pub fn logs_since(&self, since_sequence: u64) -> Vec<LogEntry> {
        let state = self.lock();
        // 序号从1开始且连续，因此可以直接按位置截取
        let start = usize::try_from(since_sequence)
            .unwrap_or(usize::MAX)
            .min(state.logs.len());
        state.logs[start..].to_vec()
    }

    pub fn latest_sequence(&self) -> u64 {
        self.lock().next_sequence - 1
    }

    /// 订阅作业状态变化
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }
}
