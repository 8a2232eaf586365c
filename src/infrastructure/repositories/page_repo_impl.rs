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

use crate::domain::models::page::Page;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::page_repository::PageRepository;
use crate::infrastructure::database::entities::page as page_entity;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;

/// 页面仓库实现
///
/// 按url_hash寻址的后写者胜upsert
#[derive(Clone)]
pub struct PageRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl PageRepositoryImpl {
    /// 创建新的页面仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<page_entity::Model> for Page {
    fn from(model: page_entity::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            canonical_url: model.canonical_url,
            url_hash: model.url_hash,
            content_hash: model.content_hash,
            status_code: model.status_code,
            title: model.title,
            description: model.description,
            markdown: model.markdown,
            raw_html: model.raw_html,
            renderer: model.renderer.and_then(|r| r.parse().ok()),
            links_internal: model.links_internal.unwrap_or_default(),
            links_external: model.links_external.unwrap_or_default(),
            word_count: model.word_count,
            read_time_minutes: model.read_time_minutes,
            fetch_duration_ms: model.fetch_duration_ms,
            og_image: model.og_image,
            favicon_url: model.favicon_url,
            site_name: model.site_name,
            language: model.language,
            author: model.author,
            published_at: model.published_at,
            fetched_at: model.fetched_at,
            error_code: model.error_code,
            error_message: model.error_message,
        }
    }
}

fn to_active_model(page: &Page) -> page_entity::ActiveModel {
    page_entity::ActiveModel {
        id: Set(page.id),
        url: Set(page.url.clone()),
        canonical_url: Set(page.canonical_url.clone()),
        url_hash: Set(page.url_hash.clone()),
        content_hash: Set(page.content_hash.clone()),
        status_code: Set(page.status_code),
        title: Set(page.title.clone()),
        description: Set(page.description.clone()),
        markdown: Set(page.markdown.clone()),
        raw_html: Set(page.raw_html.clone()),
        renderer: Set(page.renderer.map(|r| r.to_string())),
        links_internal: Set(Some(page.links_internal.clone())),
        links_external: Set(Some(page.links_external.clone())),
        word_count: Set(page.word_count),
        read_time_minutes: Set(page.read_time_minutes),
        fetch_duration_ms: Set(page.fetch_duration_ms),
        og_image: Set(page.og_image.clone()),
        favicon_url: Set(page.favicon_url.clone()),
        site_name: Set(page.site_name.clone()),
        language: Set(page.language.clone()),
        author: Set(page.author.clone()),
        published_at: Set(page.published_at.clone()),
        fetched_at: Set(page.fetched_at),
        error_code: Set(page.error_code.clone()),
        error_message: Set(page.error_message.clone()),
    }
}

#[async_trait]
impl PageRepository for PageRepositoryImpl {
    async fn upsert(&self, page: &Page) -> Result<Page, RepositoryError> {
        let existing = page_entity::Entity::find()
            .filter(page_entity::Column::UrlHash.eq(page.url_hash.clone()))
            .one(self.db.as_ref())
            .await?;

        match existing {
            Some(row) => {
                // 行已存在：保留原id，其余字段整体覆盖（后写者胜）
                let mut active = to_active_model(page);
                active.id = Set(row.id);
                let updated = active.update(self.db.as_ref()).await?;
                Ok(updated.into())
            }
            None => {
                let active = to_active_model(page);
                let inserted = active.insert(self.db.as_ref()).await?;
                Ok(inserted.into())
            }
        }
    }

    async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<Page>, RepositoryError> {
        let model = page_entity::Entity::find()
            .filter(page_entity::Column::UrlHash.eq(url_hash))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<Page>, RepositoryError> {
        let model = page_entity::Entity::find()
            .filter(page_entity::Column::ContentHash.eq(content_hash))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }
}
