// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobType};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 队列深度超过水位
    #[error("Queue is at capacity")]
    Full,
}

/// 作业队列特质
///
/// 持久化队列：崩溃恢复即扫描租约过期的running作业，
/// 不引入独立的消息中间件
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 提交作业
    ///
    /// 幂等键命中时返回既有作业（第二个返回值为true），
    /// 不创建新行
    async fn submit(
        &self,
        api_key_id: Uuid,
        job_type: JobType,
        params: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Result<(Job, bool), QueueError>;

    /// 原子认领下一个排队作业
    async fn claim(&self) -> Result<Option<Job>, QueueError>;

    /// 只读查询作业
    async fn status(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// 取消作业（排队作业直接终态，运行中作业协作取消）
    async fn cancel(&self, id: Uuid) -> Result<Option<Job>, QueueError>;
}

/// PostgreSQL作业队列实现
pub struct PostgresJobQueue<R: JobRepository> {
    /// 作业仓库
    repository: Arc<R>,
    /// 背压水位
    watermark: u64,
}

impl<R: JobRepository> PostgresJobQueue<R> {
    /// 创建新的PostgreSQL作业队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 作业仓库
    /// * `watermark` - 排队深度上限，超过时submit返回QUEUE_FULL
    pub fn new(repository: Arc<R>, watermark: u64) -> Self {
        Self {
            repository,
            watermark,
        }
    }
}

#[async_trait]
impl<R: JobRepository> JobQueue for PostgresJobQueue<R> {
    async fn submit(
        &self,
        api_key_id: Uuid,
        job_type: JobType,
        params: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Result<(Job, bool), QueueError> {
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self
                .repository
                .find_by_idempotency_key(api_key_id, key)
                .await?
            {
                return Ok((existing, true));
            }
        }

        if self.repository.count_queued().await? >= self.watermark {
            return Err(QueueError::Full);
        }

        let job = Job::new(api_key_id, job_type, params, idempotency_key.clone());
        match self.repository.create(&job).await {
            Ok(created) => Ok((created, false)),
            // 并发的重复提交输给了唯一约束：改读赢家
            Err(RepositoryError::AlreadyExists) => {
                let key = idempotency_key.as_deref().unwrap_or_default();
                let existing = self
                    .repository
                    .find_by_idempotency_key(api_key_id, key)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                Ok((existing, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim(&self) -> Result<Option<Job>, QueueError> {
        Ok(self.repository.claim_next().await?)
    }

    async fn status(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    async fn cancel(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        Ok(self.repository.request_cancel(id).await?)
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn submit(
        &self,
        api_key_id: Uuid,
        job_type: JobType,
        params: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Result<(Job, bool), QueueError> {
        (**self)
            .submit(api_key_id, job_type, params, idempotency_key)
            .await
    }

    async fn claim(&self) -> Result<Option<Job>, QueueError> {
        (**self).claim().await
    }

    async fn status(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        (**self).status(id).await
    }

    async fn cancel(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        (**self).cancel(id).await
    }
}

#[cfg(test)]
#[path = "job_queue_test.rs"]
mod tests;
