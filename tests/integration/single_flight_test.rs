// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use extractrs::utils::errors::{ErrorCode, PipelineError};
use extractrs::utils::single_flight::SingleFlight;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// N个并发调用者共享同一次底层计算
#[tokio::test]
async fn test_n_concurrent_callers_one_execution() {
    let flight = Arc::new(SingleFlight::<String>::new());
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..25 {
        let flight = flight.clone();
        let fetches = fetches.clone();
        handles.push(tokio::spawn(async move {
            let (markdown, _) = flight
                .run("url-hash-1", move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    "# Page".to_string()
                })
                .await;
            markdown
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "# Page");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

/// 错误结果同样被共享：后到者收到首个调用者的失败
#[tokio::test]
async fn test_followers_share_the_leaders_error() {
    let flight = Arc::new(SingleFlight::<Result<String, PipelineError>>::new());
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let flight = flight.clone();
        let attempts = attempts.clone();
        handles.push(tokio::spawn(async move {
            let (result, _) = flight
                .run("failing-hash", move || async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err(PipelineError::new(ErrorCode::FetchTimeout, "upstream slow"))
                })
                .await;
            result
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::FetchTimeout);
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

/// 完成后同一键重新计算（条目在完成时移除）
#[tokio::test]
async fn test_fresh_computation_after_completion() {
    let flight = SingleFlight::<u32>::new();
    let (a, _) = flight.run("k", || async { 1 }).await;
    let (b, _) = flight.run("k", || async { 2 }).await;
    assert_eq!((a, b), (1, 2));
}
