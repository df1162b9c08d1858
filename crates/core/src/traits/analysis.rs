//! 外部分析服务接口
//!
//! 分析服务不可靠：调用可能因网络、超时、限流而瞬时失败，也可能因认证或
//! 请求无效而永久失败。实现方通过 [`OrchestratorError::call_failure`] 返回
//! 分类后的错误，重试决策由调用方负责。
//!
//! [`OrchestratorError::call_failure`]: orchestrator_errors::OrchestratorError::call_failure

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{models::AgentDescriptor, OrchestratorResult};

/// 一次分析调用的输入
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub job_id: Uuid,
    pub file_path: String,
    pub content: String,
    pub agent: AgentDescriptor,
}

/// 分析服务抽象接口
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// 提供方名称，用于日志
    fn name(&self) -> &str;

    /// 执行一次分析，返回原始文本输出
    ///
    /// `timeout` 是本次调用允许的最长时间，调用方同时会在外层强制超时。
    async fn invoke(&self, request: &AnalysisRequest, timeout: Duration)
        -> OrchestratorResult<String>;
}
