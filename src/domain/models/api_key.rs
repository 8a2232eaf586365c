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
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// API密钥作用域枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// 单页抓取
    Scrape,
    /// 站点地图
    Map,
    /// 搜索
    Search,
    /// LLM提取
    Agent,
    /// 管理
    Admin,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Scrape => write!(f, "scrape"),
            Scope::Map => write!(f, "map"),
            Scope::Search => write!(f, "search"),
            Scope::Agent => write!(f, "agent"),
            Scope::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scrape" => Ok(Scope::Scrape),
            "map" => Ok(Scope::Map),
            "search" => Ok(Scope::Search),
            "agent" => Ok(Scope::Agent),
            "admin" => Ok(Scope::Admin),
            _ => Err(()),
        }
    }
}

/// API密钥实体
///
/// 明文只在创建时返回一次，存储的是以服务端密钥加盐的
/// HMAC-SHA256哈希；吊销为软删除，历史数据保留
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// 密钥唯一标识符
    pub id: Uuid,
    /// 明文的加盐哈希（唯一）
    pub key_hash: String,
    /// 展示名称
    pub name: String,
    /// 作用域集合
    pub scopes: Vec<Scope>,
    /// 每分钟请求数限制
    pub rate_limit: i32,
    /// 是否启用
    pub is_active: bool,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 最近使用时间
    pub last_used_at: Option<DateTime<FixedOffset>>,
}

impl ApiKey {
    /// 创建新的API密钥实体
    pub fn new(key_hash: String, name: String, scopes: Vec<Scope>, rate_limit: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            key_hash,
            name,
            scopes,
            rate_limit,
            is_active: true,
            created_at: Utc::now().into(),
            last_used_at: None,
        }
    }

    /// 检查是否持有指定作用域
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// 计算明文的加盐哈希
    ///
    /// 盐是进程级的服务端密钥，同一密钥下哈希确定，
    /// 认证路径得以按哈希做O(1)查找
    ///
    /// # 参数
    ///
    /// * `secret` - 服务端加盐密钥
    /// * `raw_key` - 客户端出示的明文
    ///
    /// # 返回值
    ///
    /// 十六进制的HMAC-SHA256摘要
    pub fn hash_key(secret: &str, raw_key: &str) -> String {
        // HMAC对任意长度的密钥都可用
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(raw_key.as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }
}
