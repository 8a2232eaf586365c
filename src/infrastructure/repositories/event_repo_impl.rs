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

use crate::domain::models::event::Event;
use crate::domain::repositories::event_repository::EventRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::infrastructure::database::entities::event as event_entity;
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;

/// 事件仓库实现
#[derive(Clone)]
pub struct EventRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl EventRepositoryImpl {
    /// 创建新的事件仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventRepository for EventRepositoryImpl {
    async fn append(&self, event: &Event) -> Result<(), RepositoryError> {
        let model = event_entity::ActiveModel {
            id: Set(event.id),
            api_key_id: Set(event.api_key_id),
            job_id: Set(event.job_id),
            event_type: Set(event.event_type.clone()),
            level: Set(event.level.to_string()),
            message: Set(event.message.clone()),
            metadata: Set(event.metadata.clone()),
            created_at: Set(event.created_at),
        };
        model.insert(self.db.as_ref()).await?;
        Ok(())
    }
}
