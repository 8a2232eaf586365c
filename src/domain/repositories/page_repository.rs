// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::Page;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;

/// 页面仓库特质
///
/// 页面按内容寻址共享，不属于任何单一调用方；写入为后写者胜
#[async_trait]
pub trait PageRepository: Send + Sync {
    /// 按url_hash插入或覆盖页面
    async fn upsert(&self, page: &Page) -> Result<Page, RepositoryError>;

    /// 按url_hash查找页面
    async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<Page>, RepositoryError>;

    /// 按content_hash查找任一页面（跨URL内容复用）
    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<Page>, RepositoryError>;
}
