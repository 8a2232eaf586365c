// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::api_key::ApiKey;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// API密钥仓库特质
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// 创建新密钥
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, RepositoryError>;

    /// 按明文哈希查找密钥
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepositoryError>;

    /// 按ID查找密钥
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, RepositoryError>;

    /// 列出全部密钥
    async fn list(&self) -> Result<Vec<ApiKey>, RepositoryError>;

    /// 写回密钥；除last_used_at与is_active外的字段创建后不变
    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, RepositoryError>;

    /// 刷新最近使用时间
    async fn touch_last_used(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 软吊销（is_active=false，历史保留）
    async fn deactivate(&self, id: Uuid) -> Result<(), RepositoryError>;
}
