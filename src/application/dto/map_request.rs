// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::RenderPolicy;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_max_depth() -> u32 {
    2
}

fn default_max_pages() -> u32 {
    100
}

fn default_concurrency() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_render_policy() -> RenderPolicy {
    RenderPolicy::Never
}

/// 站点地图请求DTO
///
/// 同时作为作业的input_params持久化，所以保留Serialize
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MapRequestDto {
    /// 种子URL
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    /// 最大深度（0-5）
    #[serde(default = "default_max_depth")]
    #[validate(range(max = 5))]
    pub max_depth: u32,

    /// 最大页面数（1-1000）
    #[serde(default = "default_max_pages")]
    #[validate(range(min = 1, max = 1000))]
    pub max_pages: u32,

    /// 路径包含模式（正则）
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// 路径排除模式（正则）
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// 是否遵循robots.txt
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// 渲染策略（爬取默认不渲染）
    #[serde(default = "default_render_policy")]
    pub use_playwright: RenderPolicy,

    /// 单页期限（毫秒）
    #[validate(range(min = 1000, max = 60000))]
    pub timeout_ms: Option<u64>,

    /// 爬取并发（1-10）
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 10))]
    pub concurrency: u32,

    /// 强制刷新已缓存页面
    #[serde(default)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dto: MapRequestDto =
            serde_json::from_str(r#"{"url": "https://docs.example.com/"}"#).unwrap();
        assert_eq!(dto.max_depth, 2);
        assert_eq!(dto.max_pages, 100);
        assert_eq!(dto.concurrency, 5);
        assert!(dto.respect_robots);
        assert_eq!(dto.use_playwright, RenderPolicy::Never);
        assert!(!dto.force);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_bounds() {
        let dto: MapRequestDto = serde_json::from_str(
            r#"{"url": "https://example.com/", "max_depth": 6, "max_pages": 2000, "concurrency": 20}"#,
        )
        .unwrap();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_roundtrips_as_job_params() {
        let dto: MapRequestDto = serde_json::from_str(
            r#"{"url": "https://example.com/", "include_patterns": ["^/docs"], "max_depth": 1}"#,
        )
        .unwrap();
        let params = serde_json::to_value(&dto).unwrap();
        let back: MapRequestDto = serde_json::from_value(params).unwrap();
        assert_eq!(back.include_patterns, vec!["^/docs".to_string()]);
        assert_eq!(back.max_depth, 1);
    }
}
