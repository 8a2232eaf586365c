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

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 事件级别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// 信息
    #[default]
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warn => write!(f, "warn"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for EventLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventLevel::Info),
            "warn" => Ok(EventLevel::Warn),
            "error" => Ok(EventLevel::Error),
            _ => Err(()),
        }
    }
}

/// 审计事件实体
///
/// 仅追加的关联记录，吊销密钥不删除其历史
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识符
    pub id: Uuid,
    /// 关联API密钥ID
    pub api_key_id: Option<Uuid>,
    /// 关联作业ID
    pub job_id: Option<Uuid>,
    /// 事件类型
    pub event_type: String,
    /// 级别
    pub level: EventLevel,
    /// 消息
    pub message: Option<String>,
    /// 结构化元数据
    pub metadata: Option<serde_json::Value>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
}

impl Event {
    /// 创建新事件
    pub fn new(
        event_type: impl Into<String>,
        level: EventLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_key_id: None,
            job_id: None,
            event_type: event_type.into(),
            level,
            message: Some(message.into()),
            metadata: None,
            created_at: Utc::now().into(),
        }
    }

    /// 关联作业
    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// 关联API密钥
    pub fn with_api_key(mut self, api_key_id: Uuid) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    /// 附加结构化元数据
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_roundtrip() {
        for level in [EventLevel::Info, EventLevel::Warn, EventLevel::Error] {
            assert_eq!(level.to_string().parse::<EventLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_builder_links() {
        let job_id = Uuid::new_v4();
        let event = Event::new("crawl.page_failed", EventLevel::Warn, "fetch timed out")
            .with_job(job_id)
            .with_metadata(json!({"url": "https://example.com/a"}));
        assert_eq!(event.job_id, Some(job_id));
        assert_eq!(event.level, EventLevel::Warn);
        assert!(event.metadata.is_some());
    }
}
