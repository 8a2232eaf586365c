// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::event::Event;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;

/// 事件仓库特质
///
/// 审计日志仅追加，不提供更新与删除
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// 追加一条事件
    async fn append(&self, event: &Event) -> Result<(), RepositoryError>;
}
