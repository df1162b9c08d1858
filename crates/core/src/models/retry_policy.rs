use std::time::Duration;

use orchestrator_config::RetryConfig;
use serde::{Deserialize, Serialize};

/// 单个工作项的重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最多尝试次数（包含首次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    /// 退避间隔上限
    pub max_delay: Duration,
    /// 随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
    /// 结构校验失败后额外允许的重试次数
    pub schema_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: config.jitter_factor,
            schema_retries: config.schema_retries,
        }
    }
}

impl RetryPolicy {
    /// 第 `retry_number` 次重试（从1开始）之前的等待时间
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = retry_number.saturating_sub(1).min(i32::MAX as u32) as i32;

        // 计算指数退避间隔并限制最大间隔
        let capped = (base * self.backoff_multiplier.powi(exponent)).min(max);

        // 添加随机抖动以避免同时重试
        let jitter = if self.jitter_factor > 0.0 {
            capped * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0
        } else {
            0.0
        };
        let final_delay = (capped + jitter).clamp(0.0, max);

        Duration::try_from_secs_f64(final_delay).unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            jitter_factor: 0.0,
            schema_retries: 1,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially_until_cap() {
        let policy = policy_without_jitter();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_with_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..policy_without_jitter()
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.schema_retries, 1);
    }
}
