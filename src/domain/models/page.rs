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

/// 渲染器枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Renderer {
    /// 静态HTTP抓取
    #[default]
    Static,
    /// 无头浏览器渲染
    Headless,
}

impl fmt::Display for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Renderer::Static => write!(f, "static"),
            Renderer::Headless => write!(f, "headless"),
        }
    }
}

impl FromStr for Renderer {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Renderer::Static),
            "headless" => Ok(Renderer::Headless),
            _ => Err(()),
        }
    }
}

/// 页面实体
///
/// 一次提取的缓存结果；url_hash唯一，content_hash存在时同内容
/// 产物可跨URL复用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 页面唯一标识符
    pub id: Uuid,
    /// 请求的规范URL
    pub url: String,
    /// 最终规范URL（重定向后）
    pub canonical_url: String,
    /// 规范URL的SHA-256（缓存主键）
    pub url_hash: String,
    /// 规范化Markdown的SHA-256
    pub content_hash: Option<String>,
    /// 上游HTTP状态码
    pub status_code: Option<i32>,
    /// 标题
    pub title: Option<String>,
    /// 描述
    pub description: Option<String>,
    /// 规范化Markdown
    pub markdown: Option<String>,
    /// 原始HTML（按需保留）
    pub raw_html: Option<String>,
    /// 实际使用的渲染器
    pub renderer: Option<Renderer>,
    /// 站内链接集合
    pub links_internal: Vec<String>,
    /// 站外链接集合
    pub links_external: Vec<String>,
    /// 词数
    pub word_count: Option<i32>,
    /// 预估阅读时长（分钟）
    pub read_time_minutes: Option<i32>,
    /// 抓取耗时（毫秒）
    pub fetch_duration_ms: Option<i32>,
    /// Open Graph图片
    pub og_image: Option<String>,
    /// 站点图标
    pub favicon_url: Option<String>,
    /// 站点名称
    pub site_name: Option<String>,
    /// 文档语言
    pub language: Option<String>,
    /// 作者
    pub author: Option<String>,
    /// 发布时间
    pub published_at: Option<String>,
    /// 抓取时间
    pub fetched_at: DateTime<FixedOffset>,
    /// 终态错误码（提取失败时记录负向结果）
    pub error_code: Option<String>,
    /// 错误消息
    pub error_message: Option<String>,
}

impl Page {
    /// 创建仅含标识字段的新页面
    pub fn new(url: String, canonical_url: String, url_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            canonical_url,
            url_hash,
            content_hash: None,
            status_code: None,
            title: None,
            description: None,
            markdown: None,
            raw_html: None,
            renderer: None,
            links_internal: Vec::new(),
            links_external: Vec::new(),
            word_count: None,
            read_time_minutes: None,
            fetch_duration_ms: None,
            og_image: None,
            favicon_url: None,
            site_name: None,
            language: None,
            author: None,
            published_at: None,
            fetched_at: Utc::now().into(),
            error_code: None,
            error_message: None,
        }
    }

    /// 页面是否记录了负向结果
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_roundtrip() {
        assert_eq!("static".parse::<Renderer>().unwrap(), Renderer::Static);
        assert_eq!("headless".parse::<Renderer>().unwrap(), Renderer::Headless);
        assert!("playwright".parse::<Renderer>().is_err());
        assert_eq!(Renderer::Headless.to_string(), "headless");
    }

    #[test]
    fn test_new_page_is_clean() {
        let page = Page::new(
            "https://example.com/".into(),
            "https://example.com/".into(),
            "abc".into(),
        );
        assert!(!page.is_error());
        assert!(page.markdown.is_none());
    }
}
