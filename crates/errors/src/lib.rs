use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 外部分析调用的失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFailureKind {
    /// 网络错误
    Network,
    /// 调用超时
    Timeout,
    /// 触发限流
    RateLimit,
    /// 认证失败
    Auth,
    /// 请求本身无效（配置错误等）
    InvalidRequest,
}

impl CallFailureKind {
    /// 瞬时失败可以重试，永久失败不重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CallFailureKind::Network | CallFailureKind::Timeout | CallFailureKind::RateLimit
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallFailureKind::Network => "network",
            CallFailureKind::Timeout => "timeout",
            CallFailureKind::RateLimit => "rate_limit",
            CallFailureKind::Auth => "auth",
            CallFailureKind::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for CallFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件读取的失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAccessFailureKind {
    NotFound,
    TooLarge,
    DisallowedExtension,
    PathEscapesRoot,
    Unreadable,
}

impl FileAccessFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAccessFailureKind::NotFound => "not_found",
            FileAccessFailureKind::TooLarge => "too_large",
            FileAccessFailureKind::DisallowedExtension => "disallowed_extension",
            FileAccessFailureKind::PathEscapesRoot => "path_escapes_root",
            FileAccessFailureKind::Unreadable => "unreadable",
        }
    }
}

impl std::fmt::Display for FileAccessFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个工作项失败时记录的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    FileAccess,
    TransientCall,
    PermanentCall,
    Schema,
    Internal,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("请求校验失败: {0}")]
    Validation(String),
    #[error("作业未找到: {id}")]
    JobNotFound { id: Uuid },
    #[error("文件访问失败 [{kind}]: {path} - {message}")]
    FileAccess {
        path: String,
        kind: FileAccessFailureKind,
        message: String,
    },
    #[error("分析调用瞬时失败 [{kind}]: {message}")]
    TransientCall {
        kind: CallFailureKind,
        message: String,
    },
    #[error("分析调用永久失败 [{kind}]: {message}")]
    PermanentCall {
        kind: CallFailureKind,
        message: String,
    },
    #[error("输出结构校验失败 (agent={agent}): {}", violations.join("; "))]
    Schema {
        agent: String,
        violations: Vec<String>,
    },
    #[error("非法的工作项状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("IO错误: {0}")]
    Io(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn job_not_found(id: Uuid) -> Self {
        Self::JobNotFound { id }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn file_access<P: Into<String>, S: Into<String>>(
        path: P,
        kind: FileAccessFailureKind,
        msg: S,
    ) -> Self {
        Self::FileAccess {
            path: path.into(),
            kind,
            message: msg.into(),
        }
    }
    /// 按失败类型归入瞬时或永久调用错误
    pub fn call_failure<S: Into<String>>(kind: CallFailureKind, msg: S) -> Self {
        if kind.is_transient() {
            Self::TransientCall {
                kind,
                message: msg.into(),
            }
        } else {
            Self::PermanentCall {
                kind,
                message: msg.into(),
            }
        }
    }
    pub fn schema_error<S: Into<String>>(agent: S, violations: Vec<String>) -> Self {
        Self::Schema {
            agent: agent.into(),
            violations,
        }
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Internal(_)
                | OrchestratorError::Configuration(_)
                | OrchestratorError::PermanentCall { .. }
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransientCall { .. } | OrchestratorError::Schema { .. }
        )
    }
    /// 工作项级别错误的分类，请求级错误返回None
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            OrchestratorError::FileAccess { .. } => Some(ErrorCategory::FileAccess),
            OrchestratorError::TransientCall { .. } => Some(ErrorCategory::TransientCall),
            OrchestratorError::PermanentCall { .. } => Some(ErrorCategory::PermanentCall),
            OrchestratorError::Schema { .. } => Some(ErrorCategory::Schema),
            OrchestratorError::InvalidTransition { .. } | OrchestratorError::Internal(_) => {
                Some(ErrorCategory::Internal)
            }
            _ => None,
        }
    }
    pub fn user_message(&self) -> &str {
        match self {
            OrchestratorError::Validation(_) => "提交的文件或分析代理不合法",
            OrchestratorError::JobNotFound { .. } => "请求的作业不存在",
            OrchestratorError::FileAccess { .. } => "无法读取待分析的文件",
            OrchestratorError::TransientCall { .. } => "分析服务暂时不可用，请稍后重试",
            OrchestratorError::PermanentCall { .. } => "分析服务拒绝了请求，请检查认证与配置",
            OrchestratorError::Schema { .. } => "分析结果结构不符合预期",
            OrchestratorError::Configuration(_) => "系统配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Io(err.to_string())
    }
}
