// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::scrape_page::ScrapeOutcome;
use crate::domain::models::page::Page;
use serde::Serialize;

/// 链接集合DTO
#[derive(Debug, Clone, Serialize)]
pub struct LinksDto {
    /// 站内链接
    pub internal: Vec<String>,
    /// 站外链接
    pub external: Vec<String>,
}

/// 页面元数据DTO
#[derive(Debug, Clone, Serialize)]
pub struct PageMetadataDto {
    /// 作者
    pub author: Option<String>,
    /// 发布时间
    pub published_at: Option<String>,
    /// 文档语言
    pub language: Option<String>,
    /// 站点名称
    pub site_name: Option<String>,
    /// Open Graph图片
    pub og_image: Option<String>,
    /// 站点图标
    pub favicon_url: Option<String>,
    /// 词数
    pub word_count: Option<i32>,
    /// 预估阅读时长（分钟）
    pub read_time_minutes: Option<i32>,
    /// 抓取耗时（毫秒）
    pub fetch_duration_ms: i32,
    /// 实际使用的渲染器
    pub renderer: String,
}

/// 抓取响应DTO（页面信封）
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResponseDto {
    /// 请求的规范URL
    pub url: String,
    /// 最终规范URL
    pub canonical_url: String,
    /// 上游HTTP状态码
    pub status_code: i32,
    /// 标题
    pub title: Option<String>,
    /// 描述
    pub description: Option<String>,
    /// 规范化Markdown
    pub markdown: String,
    /// 原始HTML（按需返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    /// 链接集合（按需返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<LinksDto>,
    /// 元数据
    pub metadata: PageMetadataDto,
    /// 是否来自缓存
    pub cached: bool,
    /// 命中的缓存层
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_layer: Option<String>,
    /// 请求追踪ID
    pub request_id: String,
}

impl ScrapeResponseDto {
    /// 由抓取结果组装响应信封
    ///
    /// # 参数
    ///
    /// * `outcome` - 协调器产出
    /// * `include_links` - 是否附带链接集合
    /// * `include_raw_html` - 是否附带原始HTML
    /// * `request_id` - 请求追踪ID
    pub fn from_outcome(
        outcome: ScrapeOutcome,
        include_links: bool,
        include_raw_html: bool,
        request_id: String,
    ) -> Self {
        let ScrapeOutcome {
            page,
            cached,
            cache_layer,
        } = outcome;
        let Page {
            url,
            canonical_url,
            status_code,
            title,
            description,
            markdown,
            raw_html,
            renderer,
            links_internal,
            links_external,
            word_count,
            read_time_minutes,
            fetch_duration_ms,
            og_image,
            favicon_url,
            site_name,
            language,
            author,
            published_at,
            ..
        } = page;

        Self {
            url,
            canonical_url,
            status_code: status_code.unwrap_or(200),
            title,
            description,
            markdown: markdown.unwrap_or_default(),
            raw_html: if include_raw_html { raw_html } else { None },
            links: include_links.then_some(LinksDto {
                internal: links_internal,
                external: links_external,
            }),
            metadata: PageMetadataDto {
                author,
                published_at,
                language,
                site_name,
                og_image,
                favicon_url,
                word_count,
                read_time_minutes,
                fetch_duration_ms: fetch_duration_ms.unwrap_or(0),
                renderer: renderer.unwrap_or_default().to_string(),
            },
            cached,
            cache_layer: cache_layer.map(|l| l.to_string()),
            request_id,
        }
    }
}
