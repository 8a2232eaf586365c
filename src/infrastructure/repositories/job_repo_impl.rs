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

use crate::domain::models::job::{Job, JobStatus};
use crate::domain::repositories::job_repository::{JobRepository, ReapOutcome, RepositoryError};
use crate::infrastructure::database::entities::{job as job_entity, job_page as job_page_entity};
use crate::utils::errors::ErrorCode;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 作业仓库实现
///
/// 基于SeaORM的作业数据访问层；作业表即持久化队列，
/// 认领在事务内配合 FOR UPDATE SKIP LOCKED 完成
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的作业仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 幂等键的存储形态：以api_key_id为前缀，使全局唯一约束
    /// 自然落到(api_key_id, idempotency_key)作用域
    fn scoped_key(api_key_id: Uuid, idempotency_key: &str) -> String {
        format!("{}:{}", api_key_id, idempotency_key)
    }

    fn unscope_key(stored: Option<String>) -> Option<String> {
        stored.map(|s| match s.split_once(':') {
            Some((_, rest)) => rest.to_string(),
            None => s,
        })
    }
}

impl From<job_entity::Model> for Job {
    fn from(model: job_entity::Model) -> Self {
        Self {
            id: model.id,
            api_key_id: model.api_key_id,
            job_type: model.job_type.parse().unwrap_or_default(),
            status: model.status.parse().unwrap_or_default(),
            input_params: model.input_params,
            idempotency_key: JobRepositoryImpl::unscope_key(model.idempotency_key),
            result: model.result,
            error_code: model.error_code,
            error_message: model.error_message,
            pages_discovered: model.pages_discovered,
            pages_total: model.pages_total,
            heartbeat_at: model.heartbeat_at,
            requeue_count: model.requeue_count,
            cancel_requested: model.cancel_requested,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
        }
    }
}

impl From<&Job> for job_entity::ActiveModel {
    fn from(job: &Job) -> Self {
        Self {
            id: Set(job.id),
            api_key_id: Set(job.api_key_id),
            job_type: Set(job.job_type.to_string()),
            status: Set(job.status.to_string()),
            input_params: Set(job.input_params.clone()),
            idempotency_key: Set(job
                .idempotency_key
                .as_deref()
                .map(|k| JobRepositoryImpl::scoped_key(job.api_key_id, k))),
            result: Set(job.result.clone()),
            error_code: Set(job.error_code.clone()),
            error_message: Set(job.error_message.clone()),
            pages_discovered: Set(job.pages_discovered),
            pages_total: Set(job.pages_total),
            heartbeat_at: Set(job.heartbeat_at),
            requeue_count: Set(job.requeue_count),
            cancel_requested: Set(job.cancel_requested),
            created_at: Set(job.created_at),
            started_at: Set(job.started_at),
            completed_at: Set(job.completed_at),
        }
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError> {
        let model: job_entity::ActiveModel = job.into();
        match model.insert(self.db.as_ref()).await {
            Ok(inserted) => Ok(inserted.into()),
            Err(e) if e.to_string().contains("duplicate key") => {
                Err(RepositoryError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_idempotency_key(
        &self,
        api_key_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Job>, RepositoryError> {
        let stored = Self::scoped_key(api_key_id, idempotency_key);
        let model = job_entity::Entity::find()
            .filter(job_entity::Column::ApiKeyId.eq(api_key_id))
            .filter(job_entity::Column::IdempotencyKey.eq(stored))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn claim_next(&self) -> Result<Option<Job>, RepositoryError> {
        let txn = self.db.begin().await?;

        let candidate = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Queued.to_string()))
            .order_by_asc(job_entity::Column::CreatedAt)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?;

        let Some(model) = candidate else {
            txn.commit().await?;
            return Ok(None);
        };

        let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
        let mut active: job_entity::ActiveModel = model.into();
        active.status = Set(JobStatus::Running.to_string());
        active.started_at = Set(Some(now));
        active.heartbeat_at = Set(Some(now));
        let claimed = active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(claimed.into()))
    }

    async fn update(&self, job: &Job) -> Result<Job, RepositoryError> {
        let model: job_entity::ActiveModel = job.into();
        let updated = model.update(self.db.as_ref()).await?;
        Ok(updated.into())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        pages_discovered: i32,
        pages_total: Option<i32>,
    ) -> Result<(), RepositoryError> {
        let mut update = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::PagesDiscovered,
                sea_orm::sea_query::Expr::value(pages_discovered),
            )
            .col_expr(
                job_entity::Column::HeartbeatAt,
                sea_orm::sea_query::Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(
                    Utc::now(),
                )),
            );
        if let Some(total) = pages_total {
            update = update.col_expr(
                job_entity::Column::PagesTotal,
                sea_orm::sea_query::Expr::value(total),
            );
        }
        update
            .filter(job_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(model.cancel_requested)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let txn = self.db.begin().await?;

        let Some(model) = job_entity::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            txn.commit().await?;
            return Ok(None);
        };

        let status: JobStatus = model.status.parse().unwrap_or_default();
        let result = match status {
            JobStatus::Queued => {
                // 尚未被认领的作业直接进入终态
                let mut active: job_entity::ActiveModel = model.into();
                active.status = Set(JobStatus::Cancelled.to_string());
                active.completed_at = Set(Some(Utc::now().into()));
                active.update(&txn).await?
            }
            JobStatus::Running => {
                // 运行中作业置协作取消标记，由工作器在工作单元间观察
                let mut active: job_entity::ActiveModel = model.into();
                active.cancel_requested = Set(true);
                active.update(&txn).await?
            }
            // 终态粘滞
            _ => model,
        };

        txn.commit().await?;
        Ok(Some(result.into()))
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let mut active: job_entity::ActiveModel = model.into();
        active.status = Set(JobStatus::Failed.to_string());
        active.error_code = Set(Some(code.as_str().to_string()));
        active.error_message = Set(Some(message.to_string()));
        active.completed_at = Set(Some(Utc::now().into()));
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn count_queued(&self) -> Result<u64, RepositoryError> {
        let count = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Queued.to_string()))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn reap_stalled(
        &self,
        lease: chrono::Duration,
    ) -> Result<ReapOutcome, RepositoryError> {
        let cutoff: chrono::DateTime<chrono::FixedOffset> = (Utc::now() - lease).into();
        let txn = self.db.begin().await?;

        let stalled = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Running.to_string()))
            .filter(job_entity::Column::HeartbeatAt.lt(cutoff))
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        let mut outcome = ReapOutcome::default();
        for model in stalled {
            let job_id = model.id;
            let requeue_count = model.requeue_count;
            let mut active: job_entity::ActiveModel = model.into();
            if requeue_count >= 1 {
                // 二次失联不再回收
                active.status = Set(JobStatus::Failed.to_string());
                active.error_code = Set(Some(ErrorCode::WorkerStalled.as_str().to_string()));
                active.error_message =
                    Set(Some("Worker lease expired twice without progress".to_string()));
                active.completed_at = Set(Some(Utc::now().into()));
                outcome.stalled += 1;
                tracing::error!("job {} failed after repeated worker stall", job_id);
            } else {
                active.status = Set(JobStatus::Queued.to_string());
                active.requeue_count = Set(requeue_count + 1);
                active.started_at = Set(None);
                active.heartbeat_at = Set(None);
                outcome.requeued += 1;
                tracing::warn!("job {} reclaimed from stalled worker", job_id);
            }
            active.update(&txn).await?;
        }

        txn.commit().await?;
        Ok(outcome)
    }

    async fn link_page(
        &self,
        job_id: Uuid,
        page_id: Uuid,
        depth: i32,
    ) -> Result<(), RepositoryError> {
        let model = job_page_entity::ActiveModel {
            job_id: Set(job_id),
            page_id: Set(page_id),
            depth: Set(depth),
        };
        let insert = job_page_entity::Entity::insert(model).on_conflict(
            OnConflict::columns([
                job_page_entity::Column::JobId,
                job_page_entity::Column::PageId,
            ])
            .do_nothing()
            .to_owned(),
        );
        match insert.exec(self.db.as_ref()).await {
            Ok(_) => Ok(()),
            // 同一作业对同一页面的重复关联是无操作
            Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
