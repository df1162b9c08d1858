use std::sync::Arc;

use orchestrator_core::{
    AdmittedItem, AgentDescriptor, AnalysisRequest, FileAccess, LogLevel, ProgressTracker,
    TerminalTransition,
};
use orchestrator_errors::{FileAccessFailureKind, OrchestratorError, OrchestratorResult};
use tokio_util::sync::CancellationToken;

use crate::retry_executor::RetryExecutor;

/// 执行单个工作项：读取文件，然后交给重试执行器
pub struct ItemRunner {
    file_access: Arc<dyn FileAccess>,
    executor: RetryExecutor,
}

impl ItemRunner {
    pub fn new(file_access: Arc<dyn FileAccess>, executor: RetryExecutor) -> Self {
        Self {
            file_access,
            executor,
        }
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub async fn run(
        &self,
        tracker: &ProgressTracker,
        item: &AdmittedItem,
        agent: &AgentDescriptor,
        token: &CancellationToken,
    ) -> OrchestratorResult<TerminalTransition> {
        let content = match self.read_input(item, agent).await {
            Ok(content) => content,
            // 文件访问失败的工作项不调用分析服务
            Err(e) => return tracker.complete_failure(item.index, "file_access", &e),
        };
        tracker.log(
            LogLevel::Debug,
            Some(item.index),
            format!("已读取文件 ({} 字节)", content.len()),
        );

        let request = AnalysisRequest {
            job_id: tracker.job_id(),
            file_path: item.file_path.clone(),
            content,
            agent: agent.clone(),
        };
        self.executor
            .execute(tracker, item.index, &request, token)
            .await
    }

    async fn read_input(
        &self,
        item: &AdmittedItem,
        agent: &AgentDescriptor,
    ) -> OrchestratorResult<String> {
        let bytes = self.file_access.read(&item.file_path).await?;
        let limit = agent.constraints.max_input_bytes;
        if bytes.len() > limit {
            return Err(OrchestratorError::file_access(
                &item.file_path,
                FileAccessFailureKind::TooLarge,
                format!(
                    "文件大小 {} 字节超过代理 {} 的输入上限 {} 字节",
                    bytes.len(),
                    agent.key,
                    limit
                ),
            ));
        }
        String::from_utf8(bytes).map_err(|e| {
            OrchestratorError::file_access(
                &item.file_path,
                FileAccessFailureKind::Unreadable,
                format!("文件内容不是有效的UTF-8文本: {e}"),
            )
        })
    }
}
