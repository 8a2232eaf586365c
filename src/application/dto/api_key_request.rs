// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::api_key::ApiKey;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 创建API密钥请求DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKeyDto {
    /// 展示名称
    #[validate(length(max = 128))]
    pub name: Option<String>,

    /// 每分钟请求数限制
    #[validate(range(min = 1, max = 100000))]
    pub rate_limit: Option<i32>,

    /// 作用域集合（字符串，见Scope枚举）
    pub scopes: Option<Vec<String>>,
}

/// 更新API密钥请求DTO
///
/// 密钥创建后除last_used_at外只有is_active可变；名称、限额或
/// 作用域的变更走吊销加重建
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateApiKeyDto {
    /// 启用状态
    pub is_active: Option<bool>,
}

/// API密钥响应DTO
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyDto {
    /// 密钥ID
    pub id: Uuid,
    /// 展示名称
    pub name: String,
    /// 作用域集合
    pub scopes: Vec<String>,
    /// 每分钟请求数限制
    pub rate_limit: i32,
    /// 启用状态
    pub is_active: bool,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 最近使用时间
    pub last_used_at: Option<DateTime<FixedOffset>>,
}

/// 创建响应DTO：明文只在这里出现一次
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKeyDto {
    /// 密钥元数据
    #[serde(flatten)]
    pub key: ApiKeyDto,
    /// 明文密钥（仅创建时返回）
    pub raw_key: String,
}

impl From<&ApiKey> for ApiKeyDto {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            scopes: key.scopes.iter().map(|s| s.to_string()).collect(),
            rate_limit: key.rate_limit,
            is_active: key.is_active,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        }
    }
}
