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

use crate::domain::models::api_key::{ApiKey, Scope};
use crate::domain::repositories::api_key_repository::ApiKeyRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::infrastructure::database::entities::api_key as api_key_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// API密钥仓库实现
#[derive(Clone)]
pub struct ApiKeyRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl ApiKeyRepositoryImpl {
    /// 创建新的API密钥仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<api_key_entity::Model> for ApiKey {
    fn from(model: api_key_entity::Model) -> Self {
        Self {
            id: model.id,
            key_hash: model.key_hash,
            name: model.name,
            scopes: model
                .scopes
                .iter()
                .filter_map(|s| s.parse::<Scope>().ok())
                .collect(),
            rate_limit: model.rate_limit,
            is_active: model.is_active,
            created_at: model.created_at,
            last_used_at: model.last_used_at,
        }
    }
}

fn to_active_model(api_key: &ApiKey) -> api_key_entity::ActiveModel {
    api_key_entity::ActiveModel {
        id: Set(api_key.id),
        key_hash: Set(api_key.key_hash.clone()),
        name: Set(api_key.name.clone()),
        scopes: Set(api_key.scopes.iter().map(Scope::to_string).collect()),
        rate_limit: Set(api_key.rate_limit),
        is_active: Set(api_key.is_active),
        created_at: Set(api_key.created_at),
        last_used_at: Set(api_key.last_used_at),
    }
}

#[async_trait]
impl ApiKeyRepository for ApiKeyRepositoryImpl {
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, RepositoryError> {
        let model = to_active_model(api_key);
        let inserted = model.insert(self.db.as_ref()).await?;
        Ok(inserted.into())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepositoryError> {
        let model = api_key_entity::Entity::find()
            .filter(api_key_entity::Column::KeyHash.eq(key_hash))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, RepositoryError> {
        let model = api_key_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<ApiKey>, RepositoryError> {
        let models = api_key_entity::Entity::find()
            .order_by_asc(api_key_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, RepositoryError> {
        let model = to_active_model(api_key);
        let updated = model.update(self.db.as_ref()).await?;
        Ok(updated.into())
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), RepositoryError> {
        let model = api_key_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let mut active: api_key_entity::ActiveModel = model.into();
        active.last_used_at = Set(Some(Utc::now().into()));
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), RepositoryError> {
        let model = api_key_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let mut active: api_key_entity::ActiveModel = model.into();
        active.is_active = Set(false);
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}
