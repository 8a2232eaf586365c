// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use extractrs::domain::models::job::{Job, JobStatus};
use extractrs::domain::repositories::job_repository::{
    JobRepository, ReapOutcome, RepositoryError,
};
use extractrs::utils::errors::ErrorCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// 内存作业仓库
///
/// 与持久实现同语义的测试替身：幂等键唯一、认领互斥、
/// 租约回收至多一次；附带直接改写心跳的后门用于回收测试
#[derive(Default)]
pub struct InMemoryJobRepo {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobRepo {
    /// 把作业心跳拨回到过去，模拟失联的工作器
    pub fn age_heartbeat(&self, id: Uuid, seconds: i64) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(&id) {
            job.heartbeat_at = Some((Utc::now() - chrono::Duration::seconds(seconds)).into());
        }
    }

    /// 读取当前快照
    pub fn snapshot(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().get(&id).cloned()
    }
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
            let stale = job.heartbeat_at.map(|hb| hb < cutoff).unwrap_or(true);
            if !stale {
                continue;
            }
            if job.requeue_count >= 1 {
                job.status = JobStatus::Failed;
                job.error_code = Some(ErrorCode::WorkerStalled.as_str().to_string());
                job.error_message =
                    Some("Worker lease expired twice without progress".into());
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
