use tokio_util::sync::CancellationToken;

/// 单个作业的取消信号
///
/// 只能被设置一次，之后的调用是幂等的。检查是协作式的：调度器在接纳新工作项之前、
/// 重试执行器在每次尝试之前检查，正在进行的外部调用不会被打断。
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发取消信号，重复调用无副作用
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 跨并发边界传递的令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
