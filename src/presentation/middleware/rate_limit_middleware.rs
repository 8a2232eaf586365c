// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// 滑动窗口长度
const WINDOW: Duration = Duration::from_secs(60);

/// 速率限制错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RateLimitError {
    /// 请求过多
    #[error("Too many requests, retry after {retry_after_seconds}s")]
    TooManyRequests {
        /// 最旧窗口条目滚出前的秒数
        retry_after_seconds: u64,
    },
}

/// 速率限制器
///
/// 每api_key在最近60秒上的滑动窗口计数。时间源为单调时钟；
/// 每个键的增量在独立互斥段内串行，单键并发突发不会超限放行
pub struct RateLimiter {
    /// 每键的窗口（单调时间戳队列）
    windows: DashMap<Uuid, Mutex<VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// 创建新的速率限制器实例
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// 检查并记账一次请求
    ///
    /// # 参数
    ///
    /// * `api_key_id` - API密钥ID
    /// * `limit` - 该密钥的每分钟限额
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 放行，时间戳已入窗
    /// * `Err(RateLimitError)` - 拒绝并附带重试提示
    pub fn check(&self, api_key_id: Uuid, limit: u32) -> Result<(), RateLimitError> {
        let entry = self
            .windows
            .entry(api_key_id)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = entry.lock();

        let now = Instant::now();
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit as usize {
            let retry_after_seconds = window
                .front()
                .map(|oldest| {
                    let age = now.duration_since(*oldest);
                    WINDOW.saturating_sub(age).as_secs().max(1)
                })
                .unwrap_or(1);
            return Err(RateLimitError::TooManyRequests {
                retry_after_seconds,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// 某键当前在窗内的请求数（测试与指标用）
    pub fn in_window(&self, api_key_id: Uuid) -> usize {
        self.windows
            .get(&api_key_id)
            .map(|w| w.lock().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_limit_boundary() {
        let limiter = RateLimiter::new();
        let key = Uuid::new_v4();

        assert!(limiter.check(key, 2).is_ok());
        assert!(limiter.check(key, 2).is_ok());
        let err = limiter.check(key, 2).unwrap_err();
        match err {
            RateLimitError::TooManyRequests {
                retry_after_seconds,
            } => {
                assert!(retry_after_seconds >= 1 && retry_after_seconds <= 60);
            }
        }
        assert_eq!(limiter.in_window(key), 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a, 1).is_ok());
        assert!(limiter.check(a, 1).is_err());
        assert!(limiter.check(b, 1).is_ok());
    }

    #[test]
    fn test_concurrent_burst_never_over_admits() {
        let limiter = Arc::new(RateLimiter::new());
        let key = Uuid::new_v4();
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(std::thread::spawn(move || {
                if limiter.check(key, 10).is_ok() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }
}
