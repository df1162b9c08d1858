use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    AnalysisProvider, AnalysisRequest, AttemptStart, LogLevel, ProgressTracker, RetryPolicy,
    TerminalTransition,
};
use orchestrator_errors::{CallFailureKind, OrchestratorError, OrchestratorResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::validator::ResultValidator;

/// 单个工作项的重试执行器
///
/// 每个工作项按显式状态机推进：
/// pending → running → [retrying → running]* → {succeeded | failed | cancelled}。
/// 每次尝试之前检查取消信号；正在进行的调用不会被打断，但它结束后工作项直接转为
/// cancelled，退避等待也会被取消提前唤醒。
pub struct RetryExecutor {
    provider: Arc<dyn AnalysisProvider>,
    policy: RetryPolicy,
    default_timeout: Duration,
}

/// 一次失败尝试的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureDecision {
    Retry,
    Stop,
}

impl RetryExecutor {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        policy: RetryPolicy,
        default_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy,
            default_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute(
        &self,
        tracker: &ProgressTracker,
        index: usize,
        request: &AnalysisRequest,
        token: &CancellationToken,
    ) -> OrchestratorResult<TerminalTransition> {
        let timeout = request.agent.effective_timeout(self.default_timeout);
        let mut schema_failures = 0u32;

        loop {
            if token.is_cancelled() {
                return tracker.complete_cancelled(index, "作业已取消，不再发起新的尝试");
            }

            let attempt = match tracker.start_attempt(index)? {
                AttemptStart::Started(attempt) => attempt,
                AttemptStart::Cancelled(transition) => return Ok(transition),
            };
            metrics::counter!(
                "orchestrator_attempts_total",
                "agent" => request.agent.key.clone()
            )
            .increment(1);

            // 尝试期间收到取消请求时，tracker 会把结果记为 cancelled
            let error = match self.attempt(request, timeout).await {
                Ok(raw) => match ResultValidator::validate(&raw, &request.agent) {
                    Ok(report) => return tracker.complete_success(index, attempt, report),
                    Err(e) => e,
                },
                Err(e) => e,
            };

            let classification = classify(&error);
            if matches!(error, OrchestratorError::Schema { .. }) {
                schema_failures += 1;
            }

            match self.decide(&error, attempt, schema_failures) {
                FailureDecision::Stop => {
                    return tracker.complete_failure(index, &classification, &error);
                }
                FailureDecision::Retry if token.is_cancelled() || tracker.cancel_requested() => {
                    tracker.log(
                        LogLevel::Warn,
                        Some(index),
                        format!("第 {attempt} 次尝试失败 [{classification}]，作业已取消不再重试: {error}"),
                    );
                    return tracker.complete_cancelled(index, "作业已取消，放弃重试");
                }
                FailureDecision::Retry => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracker.mark_retrying(index, attempt, &classification, &error, delay)?;

                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(job_id = %request.job_id, index, "退避等待被取消信号唤醒");
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// 发起一次调用并在外层强制超时
    async fn attempt(&self, request: &AnalysisRequest, timeout: Duration) -> OrchestratorResult<String> {
        match tokio::time::timeout(timeout, self.provider.invoke(request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::call_failure(
                CallFailureKind::Timeout,
                format!(
                    "{} 在 {}ms 内未返回",
                    self.provider.name(),
                    timeout.as_millis()
                ),
            )),
        }
    }

    fn decide(&self, error: &OrchestratorError, attempt: u32, schema_failures: u32) -> FailureDecision {
        if attempt >= self.policy.max_attempts {
            return FailureDecision::Stop;
        }
        match error {
            OrchestratorError::TransientCall { .. } => FailureDecision::Retry,
            OrchestratorError::Schema { .. } if schema_failures <= self.policy.schema_retries => {
                FailureDecision::Retry
            }
            _ => FailureDecision::Stop,
        }
    }
}

fn classify(error: &OrchestratorError) -> String {
    match error {
        OrchestratorError::TransientCall { kind, .. } => format!("transient/{kind}"),
        OrchestratorError::PermanentCall { kind, .. } => format!("permanent/{kind}"),
        OrchestratorError::Schema { .. } => "schema".to_string(),
        OrchestratorError::FileAccess { kind, .. } => format!("file_access/{kind}"),
        _ => "internal".to_string(),
    }
}
