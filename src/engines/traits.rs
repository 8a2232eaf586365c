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

use crate::domain::models::page::Renderer;
use crate::utils::errors::{ErrorCode, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// 渲染策略枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderPolicy {
    /// 静态抓取后按启发式回退到无头渲染
    #[default]
    Auto,
    /// 始终无头渲染
    Always,
    /// 从不无头渲染
    Never,
}

impl fmt::Display for RenderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderPolicy::Auto => write!(f, "auto"),
            RenderPolicy::Always => write!(f, "always"),
            RenderPolicy::Never => write!(f, "never"),
        }
    }
}

impl FromStr for RenderPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RenderPolicy::Auto),
            "always" => Ok(RenderPolicy::Always),
            "never" => Ok(RenderPolicy::Never),
            _ => Err(()),
        }
    }
}

/// 引擎错误类型
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// 网络请求失败
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// 超时
    #[error("Fetch timed out")]
    Timeout,
    /// 上游返回不可重试的HTTP状态
    #[error("Upstream returned HTTP {0}")]
    UpstreamStatus(u16),
    /// 重定向次数超限
    #[error("Too many redirects")]
    TooManyRedirects,
    /// 无头渲染失败
    #[error("Render failed: {0}")]
    RenderFailed(String),
    /// 某一跳命中SSRF防护
    #[error("{0}")]
    Blocked(PipelineError),
}

impl EngineError {
    /// 映射为管道错误
    pub fn into_pipeline(self) -> PipelineError {
        match self {
            EngineError::RequestFailed(msg) => PipelineError::new(ErrorCode::FetchError, msg),
            EngineError::Timeout => PipelineError::new(
                ErrorCode::FetchTimeout,
                "Target URL did not respond within timeout",
            ),
            EngineError::UpstreamStatus(status) => PipelineError::new(
                ErrorCode::UpstreamHttpError,
                format!("Upstream returned HTTP {}", status),
            ),
            EngineError::TooManyRedirects => {
                PipelineError::new(ErrorCode::FetchError, "Too many redirects")
            }
            EngineError::RenderFailed(msg) => PipelineError::new(ErrorCode::RenderError, msg),
            EngineError::Blocked(inner) => inner,
        }
    }
}

/// 抓取响应
///
/// 适配抓取器的统一返回：状态、最终URL、响应头、响应体、
/// 实际渲染器与耗时
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status: u16,
    /// 重定向后的最终URL
    pub final_url: Url,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应体
    pub body: String,
    /// 实际使用的渲染器
    pub renderer: Renderer,
    /// 抓取耗时（毫秒）
    pub duration_ms: u64,
}

impl FetchResponse {
    /// 响应的Content-Type（缺省按text/html处理）
    pub fn content_type(&self) -> &str {
        let value = self
            .headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or("text/html");
        if value.trim().is_empty() {
            "text/html"
        } else {
            value
        }
    }

    /// 响应体是否为HTML
    pub fn is_html(&self) -> bool {
        self.content_type().to_ascii_lowercase().contains("text/html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_policy_roundtrip() {
        for policy in [RenderPolicy::Auto, RenderPolicy::Always, RenderPolicy::Never] {
            assert_eq!(policy.to_string().parse::<RenderPolicy>().unwrap(), policy);
        }
        assert!("sometimes".parse::<RenderPolicy>().is_err());
    }

    #[test]
    fn test_engine_error_mapping() {
        assert_eq!(
            EngineError::Timeout.into_pipeline().code,
            ErrorCode::FetchTimeout
        );
        assert_eq!(
            EngineError::UpstreamStatus(404).into_pipeline().code,
            ErrorCode::UpstreamHttpError
        );
        assert_eq!(
            EngineError::RenderFailed("boom".into()).into_pipeline().code,
            ErrorCode::RenderError
        );
        let blocked = EngineError::Blocked(PipelineError::new(
            ErrorCode::SsrfBlocked,
            "blocked range",
        ));
        assert_eq!(blocked.into_pipeline().code, ErrorCode::SsrfBlocked);
    }

    #[test]
    fn test_content_type_default() {
        let response = FetchResponse {
            status: 200,
            final_url: Url::parse("https://example.com/").unwrap(),
            headers: HashMap::new(),
            body: String::new(),
            renderer: Renderer::Static,
            duration_ms: 0,
        };
        assert_eq!(response.content_type(), "text/html");
        assert!(response.is_html());
    }
}
