// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::RenderPolicy;
use serde::Deserialize;
use validator::Validate;

fn default_true() -> bool {
    true
}

/// 抓取请求DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScrapeRequestDto {
    /// 目标URL
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    /// 渲染策略
    #[serde(default)]
    pub use_playwright: RenderPolicy,

    /// 是否在响应中包含链接集合
    #[serde(default = "default_true")]
    pub include_links: bool,

    /// 是否在响应中包含原始HTML
    #[serde(default)]
    pub include_raw_html: bool,

    /// 是否遵循robots.txt
    #[serde(default)]
    pub respect_robots: bool,

    /// 请求期限（毫秒），上限60秒
    #[validate(range(min = 1000, max = 60000))]
    pub timeout_ms: Option<u64>,

    /// 缓存TTL（秒）；缺省用默认值，显式null不设上限
    ///
    /// 双层Option：外层区分字段是否出现，内层承载显式null
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub cache_ttl_seconds: Option<Option<u32>>,

    /// 强制刷新，跳过缓存
    #[serde(default)]
    pub force_refresh: bool,
}

/// 把显式null与字段缺失区分开来
fn deserialize_explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::<u32>::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dto: ScrapeRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/"}"#).unwrap();
        assert_eq!(dto.use_playwright, RenderPolicy::Auto);
        assert!(dto.include_links);
        assert!(!dto.include_raw_html);
        assert!(!dto.respect_robots);
        assert!(!dto.force_refresh);
        assert!(dto.cache_ttl_seconds.is_none());
    }

    #[test]
    fn test_explicit_null_ttl_disables_cap() {
        let dto: ScrapeRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/", "cache_ttl_seconds": null}"#)
                .unwrap();
        assert_eq!(dto.cache_ttl_seconds, Some(None));

        let dto: ScrapeRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/", "cache_ttl_seconds": 60}"#)
                .unwrap();
        assert_eq!(dto.cache_ttl_seconds, Some(Some(60)));
    }

    #[test]
    fn test_timeout_validation() {
        let dto: ScrapeRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/", "timeout_ms": 500}"#).unwrap();
        assert!(dto.validate().is_err());

        let dto: ScrapeRequestDto =
            serde_json::from_str(r#"{"url": "https://example.com/", "timeout_ms": 20000}"#)
                .unwrap();
        assert!(dto.validate().is_ok());
    }
}
