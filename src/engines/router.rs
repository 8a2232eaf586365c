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

use crate::engines::browser_engine::BrowserEngine;
use crate::engines::http_engine::HttpEngine;
use crate::engines::traits::{EngineError, FetchResponse, RenderPolicy};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use url::Url;

/// 渲染触发阈值：静态响应体短于该字节数即回退
const MIN_BODY_BYTES: usize = 500;

/// 渲染触发阈值：剥离脚本样式后的有效文本短于该字符数即回退
const MIN_TEXT_CHARS: usize = 200;

static SCRIPT_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());
static META_REFRESH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?refresh["']?[^>]*url\s*=\s*([^"'>\s]+)"#)
        .unwrap()
});

/// 自适应抓取器
///
/// 按渲染策略在静态抓取与无头渲染之间调度：always直接渲染，
/// never只走静态，auto先静态抓取再按触发启发式决定是否回退
pub struct AdaptiveFetcher {
    /// 静态引擎
    http: HttpEngine,
    /// 无头渲染引擎
    browser: BrowserEngine,
}

impl Default for AdaptiveFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveFetcher {
    /// 创建新的自适应抓取器
    pub fn new() -> Self {
        Self {
            http: HttpEngine::new(),
            browser: BrowserEngine,
        }
    }

    /// 执行抓取
    ///
    /// # 参数
    ///
    /// * `url` - 规范化且已通过SSRF校验的URL
    /// * `policy` - 渲染策略
    /// * `timeout` - 调用方期限
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 抓取结果与实际渲染器标记
    /// * `Err(EngineError)` - 抓取或渲染错误
    pub async fn fetch(
        &self,
        url: &Url,
        policy: RenderPolicy,
        timeout: Duration,
    ) -> Result<FetchResponse, EngineError> {
        match policy {
            RenderPolicy::Always => self.browser.fetch(url, timeout).await,
            RenderPolicy::Never => self.http.fetch(url, timeout).await,
            RenderPolicy::Auto => {
                let fetched = self.http.fetch(url, timeout).await?;
                if !fetched.is_html() {
                    return Ok(fetched);
                }
                if needs_render(&fetched.body, &fetched.final_url) {
                    metrics::counter!("extractrs_render_fallback_total").increment(1);
                    tracing::debug!("render trigger fired for {}, falling back to headless", url);
                    return self.browser.fetch(&fetched.final_url, timeout).await;
                }
                Ok(fetched)
            }
        }
    }
}

/// 渲染触发启发式
///
/// 命中任一条件即回退无头渲染：响应体过短；包含SPA壳标记
/// （常见挂载点id或__NEXT_DATA__）；meta refresh指向他处；
/// 剥离脚本样式后的有效文本过短
pub fn needs_render(body: &str, final_url: &Url) -> bool {
    if body.len() < MIN_BODY_BYTES {
        return true;
    }

    let lowered = body.to_lowercase();
    let spa_markers = [
        r#"id="app""#,
        r#"id='app'"#,
        r#"id="root""#,
        r#"id='root'"#,
        r#"id="__next""#,
        r#"id='__next'"#,
        "__next_data__",
    ];
    if spa_markers.iter().any(|m| lowered.contains(m)) {
        return true;
    }

    if let Some(caps) = META_REFRESH_RE.captures(body) {
        let target = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Ok(resolved) = final_url.join(target) {
            if resolved != *final_url {
                return true;
            }
        }
    }

    let without_scripts = SCRIPT_STYLE_RE.replace_all(body, " ");
    let text = TAG_RE.replace_all(&without_scripts, " ");
    let effective: usize = text.split_whitespace().map(|w| w.chars().count()).sum();
    effective < MIN_TEXT_CHARS
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
