// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 抓取层默认：2s、4s、8s，共3次尝试
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 创建标准抓取重试策略
    pub fn standard() -> Self {
        Self::default()
    }

    /// 创建无重试策略
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 计算第attempt次失败后的退避时间（attempt从1开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);

        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 是否还应继续尝试（attempt为已完成的尝试数）
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let mut policy = RetryPolicy::standard();
        policy.enable_jitter = false;

        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(8));
        // 上限封顶
        assert_eq!(policy.calculate_backoff(5), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_with_jitter_stays_in_band() {
        let policy = RetryPolicy::standard();
        let backoff = policy.calculate_backoff(2);
        let expected = Duration::from_secs(4);
        let band = Duration::from_millis(400);
        assert!(backoff >= expected - band);
        assert!(backoff <= expected + band);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::standard();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        let none = RetryPolicy::none();
        assert!(!none.should_retry(1));
    }
}
