use async_trait::async_trait;

use crate::OrchestratorResult;

/// 文件访问抽象接口
///
/// 失败时返回 `OrchestratorError::FileAccess`，对应的工作项直接失败且不会调用分析服务。
#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn read(&self, path: &str) -> OrchestratorResult<Vec<u8>>;
}
