// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use extractrs::presentation::middleware::rate_limit_middleware::{RateLimitError, RateLimiter};
use uuid::Uuid;

/// 限额为n的键在60秒窗口内提交n+1次，恰好最后一次被拒
#[test]
fn test_rate_limit_boundary() {
    let limiter = RateLimiter::new();
    let key = Uuid::new_v4();
    let limit = 5u32;

    for i in 0..limit {
        assert!(limiter.check(key, limit).is_ok(), "request {} should pass", i);
    }

    let rejections = (0..3)
        .filter(|_| limiter.check(key, limit).is_err())
        .count();
    assert_eq!(rejections, 3, "every over-limit request is rejected");
    assert_eq!(limiter.in_window(key), limit as usize);
}

#[test]
fn test_retry_after_hint_is_bounded_by_window() {
    let limiter = RateLimiter::new();
    let key = Uuid::new_v4();

    limiter.check(key, 1).unwrap();
    match limiter.check(key, 1).unwrap_err() {
        RateLimitError::TooManyRequests {
            retry_after_seconds,
        } => {
            assert!(retry_after_seconds >= 1);
            assert!(retry_after_seconds <= 60);
        }
    }
}

#[test]
fn test_limits_are_read_per_key() {
    let limiter = RateLimiter::new();
    let generous = Uuid::new_v4();
    let strict = Uuid::new_v4();

    for _ in 0..10 {
        assert!(limiter.check(generous, 100).is_ok());
    }
    assert!(limiter.check(strict, 1).is_ok());
    assert!(limiter.check(strict, 1).is_err());
    // 另一个键不受影响
    assert!(limiter.check(generous, 100).is_ok());
}
