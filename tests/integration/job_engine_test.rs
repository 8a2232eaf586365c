// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::InMemoryJobRepo;
use extractrs::domain::models::job::{JobStatus, JobType};
use extractrs::domain::repositories::job_repository::JobRepository;
use extractrs::queue::job_queue::{JobQueue, PostgresJobQueue};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn engine() -> (PostgresJobQueue<InMemoryJobRepo>, Arc<InMemoryJobRepo>) {
    let repo = Arc::new(InMemoryJobRepo::default());
    (PostgresJobQueue::new(repo.clone(), 100), repo)
}

#[tokio::test]
async fn test_job_reaches_at_most_one_terminal_state() {
    let (queue, repo) = engine();
    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({"url": "https://example.com/"}), None)
        .await
        .unwrap();

    let claimed = queue.claim().await.unwrap().unwrap();
    let completed = claimed.complete(json!({"count": 0})).unwrap();
    repo.update(&completed).await.unwrap();

    // 终态后取消是无操作
    let after_cancel = queue.cancel(job.id).await.unwrap().unwrap();
    assert_eq!(after_cancel.status, JobStatus::Completed);

    // 结果在重复读取下保持稳定
    let first = queue.status(job.id).await.unwrap().unwrap();
    let second = queue.status(job.id).await.unwrap().unwrap();
    assert_eq!(first.result, second.result);
    assert_eq!(first.completed_at, second.completed_at);
}

#[tokio::test]
async fn test_two_submits_with_same_key_share_one_row() {
    let (queue, repo) = engine();
    let api_key_id = Uuid::new_v4();
    let params = json!({"url": "https://example.com/", "prompt": "titles"});

    let (a, _) = queue
        .submit(api_key_id, JobType::AgentExtract, params.clone(), Some("abc".into()))
        .await
        .unwrap();
    let (b, reused) = queue
        .submit(api_key_id, JobType::AgentExtract, params, Some("abc".into()))
        .await
        .unwrap();

    assert!(reused);
    assert_eq!(a.id, b.id);
    assert_eq!(repo.count_queued().await.unwrap(), 1);
}

#[tokio::test]
async fn test_claim_is_fifo_and_exclusive() {
    let (queue, _) = engine();
    let api_key_id = Uuid::new_v4();

    let (first, _) = queue
        .submit(api_key_id, JobType::Map, json!({"seq": 1}), None)
        .await
        .unwrap();
    // 时间戳驱动FIFO，拉开可观察的间隔
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (second, _) = queue
        .submit(api_key_id, JobType::Map, json!({"seq": 2}), None)
        .await
        .unwrap();

    let c1 = queue.claim().await.unwrap().unwrap();
    let c2 = queue.claim().await.unwrap().unwrap();
    assert_eq!(c1.id, first.id);
    assert_eq!(c2.id, second.id);
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stalled_job_is_requeued_once_then_failed() {
    let (queue, repo) = engine();
    let lease = chrono::Duration::seconds(600);

    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({}), None)
        .await
        .unwrap();

    // 第一次失联：回收重新入队
    queue.claim().await.unwrap().unwrap();
    repo.age_heartbeat(job.id, 3600);
    let outcome = repo.reap_stalled(lease).await.unwrap();
    assert_eq!(outcome.requeued, 1);
    assert_eq!(outcome.stalled, 0);

    let snapshot = repo.snapshot(job.id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Queued);
    assert_eq!(snapshot.requeue_count, 1);
    assert!(snapshot.started_at.is_none());

    // 第二次失联：不再回收，按WORKER_STALLED失败
    queue.claim().await.unwrap().unwrap();
    repo.age_heartbeat(job.id, 3600);
    let outcome = repo.reap_stalled(lease).await.unwrap();
    assert_eq!(outcome.requeued, 0);
    assert_eq!(outcome.stalled, 1);

    let snapshot = repo.snapshot(job.id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error_code.as_deref(), Some("WORKER_STALLED"));
}

#[tokio::test]
async fn test_healthy_job_is_not_reaped() {
    let (queue, repo) = engine();
    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({}), None)
        .await
        .unwrap();
    queue.claim().await.unwrap().unwrap();

    let outcome = repo.reap_stalled(chrono::Duration::seconds(600)).await.unwrap();
    assert_eq!(outcome.requeued, 0);
    assert_eq!(outcome.stalled, 0);
    assert_eq!(repo.snapshot(job.id).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_running_cancel_is_cooperative() {
    let (queue, repo) = engine();
    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({}), None)
        .await
        .unwrap();
    let claimed = queue.claim().await.unwrap().unwrap();

    queue.cancel(job.id).await.unwrap();
    assert!(repo.is_cancel_requested(job.id).await.unwrap());

    // 工作器观察到标记后落到终态
    let cancelled = claimed.cancel().unwrap();
    repo.update(&cancelled).await.unwrap();
    assert_eq!(repo.snapshot(job.id).unwrap().status, JobStatus::Cancelled);
}
