// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::Job;
use crate::utils::errors::ErrorCode;
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 唯一约束冲突
    #[error("Record already exists")]
    AlreadyExists,
}

/// 租约回收统计
#[derive(Debug, Default, Clone, Copy)]
pub struct ReapOutcome {
    /// 被重新入队的作业数
    pub requeued: u64,
    /// 因二次失联而失败的作业数
    pub stalled: u64,
}

/// 作业仓库特质
///
/// 作业表同时充当持久化队列；认领通过单次CAS完成，
/// 保证每个作业至多被一个工作器持有
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新作业
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError>;

    /// 根据ID查找作业
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// 按幂等键查找既有作业，作用域为(api_key_id, idempotency_key)
    async fn find_by_idempotency_key(
        &self,
        api_key_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Job>, RepositoryError>;

    /// 原子认领下一个排队作业（queued → running），无可认领时返回None
    async fn claim_next(&self) -> Result<Option<Job>, RepositoryError>;

    /// 写回作业（仅认领它的工作器在终态前调用）
    async fn update(&self, job: &Job) -> Result<Job, RepositoryError>;

    /// 写入进度计数与心跳
    async fn update_progress(
        &self,
        id: Uuid,
        pages_discovered: i32,
        pages_total: Option<i32>,
    ) -> Result<(), RepositoryError>;

    /// 读取协作取消标记
    async fn is_cancel_requested(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// 请求取消：排队作业直接进入终态，运行中作业置标记等待工作器观察
    async fn request_cancel(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// 标记作业失败
    async fn mark_failed(
        &self,
        id: Uuid,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), RepositoryError>;

    /// 当前排队深度（背压水位判断）
    async fn count_queued(&self) -> Result<u64, RepositoryError>;

    /// 回收失联作业：心跳超过租约的运行中作业重新入队一次，
    /// 二次失联按WORKER_STALLED失败
    async fn reap_stalled(&self, lease: chrono::Duration) -> Result<ReapOutcome, RepositoryError>;

    /// 记录作业与页面的关联及爬取深度
    async fn link_page(
        &self,
        job_id: Uuid,
        page_id: Uuid,
        depth: i32,
    ) -> Result<(), RepositoryError>;
}
