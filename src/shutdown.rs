use std::sync::Arc;

use orchestrator_dispatcher::{CancelAcknowledgement, JobController};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 等待 Ctrl+C 或 SIGTERM；信号处理器安装失败时返回 false
pub async fn wait_for_shutdown_signal() -> bool {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("收到Ctrl+C信号");
                true
            }
            Err(e) => {
                error!("安装Ctrl+C信号处理器失败: {e}");
                false
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("收到SIGTERM信号");
                true
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<bool>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<bool>();

    tokio::select! {
        received = ctrl_c => received,
        received = terminate => received,
    }
}

/// 收到关闭信号时取消作业
///
/// 第一次信号发起取消；之后的信号只记录日志，作业照常收尾。
pub fn spawn_cancel_on_signal(controller: Arc<JobController>, job_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        while wait_for_shutdown_signal().await {
            match controller.cancel_job(job_id).await {
                Ok(CancelAcknowledgement::Requested { drained }) => {
                    warn!(job_id = %job_id, drained, "已请求取消作业，等待进行中的工作项结束");
                }
                Ok(CancelAcknowledgement::AlreadyRequested) => {
                    info!(job_id = %job_id, "取消已在进行中");
                }
                Ok(CancelAcknowledgement::AlreadyFinished { status }) => {
                    info!(job_id = %job_id, status = %status, "作业已结束");
                    break;
                }
                Err(e) => {
                    error!(job_id = %job_id, "取消作业失败: {e}");
                    break;
                }
            }
        }
    })
}
