// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{JobQueue, PostgresJobQueue, QueueError};
use crate::domain::models::job::{Job, JobStatus, JobType};
use crate::domain::repositories::job_repository::{
    JobRepository, ReapOutcome, RepositoryError,
};
use crate::utils::errors::ErrorCode;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 内存作业仓库（测试替身），与持久实现同语义：
/// 幂等键唯一、认领互斥、租约回收至多一次
#[derive(Default)]
pub struct InMemoryJobRepo {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

#[async_trait]
impl JobRepository for InMemoryJobRepo {
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError> {
        let mut jobs = self.jobs.lock();
        if let Some(key) = job.idempotency_key.as_deref() {
            let duplicate = jobs.values().any(|j| {
                j.api_key_id == job.api_key_id && j.idempotency_key.as_deref() == Some(key)
            });
            if duplicate {
                return Err(RepositoryError::AlreadyExists);
            }
        }
        jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        api_key_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Job>, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .values()
            .find(|j| {
                j.api_key_id == api_key_id
                    && j.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .cloned())
    }

    async fn claim_next(&self) -> Result<Option<Job>, RepositoryError> {
        let mut jobs = self.jobs.lock();
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);
        let Some(id) = next_id else {
            return Ok(None);
        };
        let job = jobs.get_mut(&id).unwrap();
        job.status = JobStatus::Running;
        let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
        job.started_at = Some(now);
        job.heartbeat_at = Some(now);
        Ok(Some(job.clone()))
    }

    async fn update(&self, job: &Job) -> Result<Job, RepositoryError> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        pages_discovered: i32,
        pages_total: Option<i32>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        job.pages_discovered = pages_discovered;
        if pages_total.is_some() {
            job.pages_total = pages_total;
        }
        job.heartbeat_at = Some(Utc::now().into());
        Ok(())
    }

    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .get(&id)
            .map(|j| j.cancel_requested)
            .unwrap_or(false))
    }

    async fn request_cancel(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now().into());
            }
            JobStatus::Running => job.cancel_requested = true,
            _ => {}
        }
        Ok(Some(job.clone()))
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        job.status = JobStatus::Failed;
        job.error_code = Some(code.as_str().to_string());
        job.error_message = Some(message.to_string());
        job.completed_at = Some(Utc::now().into());
        Ok(())
    }

    async fn count_queued(&self) -> Result<u64, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .count() as u64)
    }

    async fn reap_stalled(
        &self,
        lease: chrono::Duration,
    ) -> Result<ReapOutcome, RepositoryError> {
        let cutoff = Utc::now() - lease;
        let mut outcome = ReapOutcome::default();
        let mut jobs = self.jobs.lock();
        for job in jobs.values_mut() {
            if job.status != JobStatus::Running {
                continue;
            }
            let stale = job
                .heartbeat_at
                .map(|hb| hb < cutoff)
                .unwrap_or(true);
            if !stale {
                continue;
            }
            if job.requeue_count >= 1 {
                job.status = JobStatus::Failed;
                job.error_code = Some(ErrorCode::WorkerStalled.as_str().to_string());
                job.error_message = Some("Worker lease expired twice without progress".into());
                job.completed_at = Some(Utc::now().into());
                outcome.stalled += 1;
            } else {
                job.status = JobStatus::Queued;
                job.requeue_count += 1;
                job.started_at = None;
                job.heartbeat_at = None;
                outcome.requeued += 1;
            }
        }
        Ok(outcome)
    }

    async fn link_page(
        &self,
        _job_id: Uuid,
        _page_id: Uuid,
        _depth: i32,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }
}

fn queue_with_watermark(watermark: u64) -> PostgresJobQueue<InMemoryJobRepo> {
    PostgresJobQueue::new(Arc::new(InMemoryJobRepo::default()), watermark)
}

#[tokio::test]
async fn test_submit_and_claim() {
    let queue = queue_with_watermark(10);
    let api_key_id = Uuid::new_v4();

    let (job, reused) = queue
        .submit(api_key_id, JobType::Map, json!({"url": "https://example.com/"}), None)
        .await
        .unwrap();
    assert!(!reused);
    assert_eq!(job.status, JobStatus::Queued);

    let claimed = queue.claim().await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert!(claimed.started_at.is_some());

    // 没有第二个可认领的作业
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_idempotent_submit_returns_same_job() {
    let queue = queue_with_watermark(10);
    let api_key_id = Uuid::new_v4();
    let params = json!({"url": "https://example.com/", "prompt": "extract title"});

    let (first, reused_first) = queue
        .submit(
            api_key_id,
            JobType::AgentExtract,
            params.clone(),
            Some("idem-1".into()),
        )
        .await
        .unwrap();
    assert!(!reused_first);

    let (second, reused_second) = queue
        .submit(api_key_id, JobType::AgentExtract, params, Some("idem-1".into()))
        .await
        .unwrap();
    assert!(reused_second);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_idempotency_is_scoped_per_api_key() {
    let queue = queue_with_watermark(10);
    let params = json!({"url": "https://example.com/"});

    let (a, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, params.clone(), Some("k".into()))
        .await
        .unwrap();
    let (b, reused) = queue
        .submit(Uuid::new_v4(), JobType::Map, params, Some("k".into()))
        .await
        .unwrap();
    assert!(!reused);
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_queue_full_backpressure() {
    let queue = queue_with_watermark(2);
    let api_key_id = Uuid::new_v4();
    let params = json!({"url": "https://example.com/"});

    queue
        .submit(api_key_id, JobType::Map, params.clone(), None)
        .await
        .unwrap();
    queue
        .submit(api_key_id, JobType::Map, params.clone(), None)
        .await
        .unwrap();

    let err = queue
        .submit(api_key_id, JobType::Map, params.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Full));

    // 认领一个降到水位之下后恢复接收
    queue.claim().await.unwrap().unwrap();
    assert!(queue
        .submit(api_key_id, JobType::Map, params, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cancel_queued_job_is_terminal() {
    let queue = queue_with_watermark(10);
    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({}), None)
        .await
        .unwrap();

    let cancelled = queue.cancel(job.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // 取消后不可认领
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_running_job_sets_flag_only() {
    let queue = queue_with_watermark(10);
    let (job, _) = queue
        .submit(Uuid::new_v4(), JobType::Map, json!({}), None)
        .await
        .unwrap();
    queue.claim().await.unwrap().unwrap();

    let cancelled = queue.cancel(job.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Running);
    assert!(cancelled.cancel_requested);
}
