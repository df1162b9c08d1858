use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 单个作业内同时执行的工作项上限
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.max_concurrency, "scheduler.max_concurrency", 256)?;
        Ok(())
    }
}

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 每个工作项最多尝试次数（包含首次）
    pub max_attempts: u32,
    /// 基础重试间隔（毫秒）
    pub base_delay_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 最大重试间隔（毫秒）
    pub max_delay_ms: u64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
    /// 结构校验失败后额外允许的重试次数
    pub schema_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_factor: 0.1,
            schema_retries: 1,
        }
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.max_attempts as usize, "retry.max_attempts", 20)?;

        if self.backoff_multiplier < 1.0 {
            return Err(crate::ConfigError::Validation(
                "retry.backoff_multiplier must be greater than or equal to 1.0".to_string(),
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(crate::ConfigError::Validation(
                "retry.max_delay_ms must be greater than or equal to retry.base_delay_ms"
                    .to_string(),
            ));
        }

        ValidationUtils::validate_ratio(self.jitter_factor, "retry.jitter_factor")?;

        if self.schema_retries >= self.max_attempts {
            return Err(crate::ConfigError::Validation(
                "retry.schema_retries must be less than retry.max_attempts".to_string(),
            ));
        }

        Ok(())
    }
}
