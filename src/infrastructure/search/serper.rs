// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::search_result::{SearchResult, SearchType};
use crate::domain::services::search_service::SearchProvider;
use crate::utils::errors::{ErrorCode, PipelineError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// 搜索请求超时
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Serper搜索提供商
///
/// google.serper.dev 的HTTP客户端；web与news分别走
/// /search 与 /news 端点
pub struct SerperProvider {
    /// API密钥
    api_key: Option<String>,
    /// HTTP客户端
    client: reqwest::Client,
}

impl SerperProvider {
    /// 创建新的Serper提供商实例
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(search_type: SearchType) -> &'static str {
        match search_type {
            SearchType::Web => "https://google.serper.dev/search",
            SearchType::News => "https://google.serper.dev/news",
        }
    }

    fn result_field(search_type: SearchType) -> &'static str {
        match search_type {
            SearchType::Web => "organic",
            SearchType::News => "news",
        }
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        search_type: SearchType,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            PipelineError::new(
                ErrorCode::InternalError,
                "Search provider API key not configured",
            )
        })?;

        let response = self
            .client
            .post(Self::endpoint(search_type))
            .header("X-API-KEY", api_key)
            .header("Content-Type", "application/json")
            .json(&json!({"q": query, "num": num_results}))
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::new(ErrorCode::FetchTimeout, "Search provider timed out")
                } else {
                    PipelineError::new(
                        ErrorCode::FetchError,
                        format!("Search provider unreachable: {}", e),
                    )
                }
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::new(
                ErrorCode::FetchError,
                format!("Search provider returned HTTP {}", response.status()),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::new(
                ErrorCode::FetchError,
                format!("Invalid search provider response: {}", e),
            )
        })?;

        let items = body
            .get(Self::result_field(search_type))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let results = items
            .iter()
            .take(num_results)
            .enumerate()
            .map(|(idx, item)| SearchResult {
                rank: idx as i32 + 1,
                title: item
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                url: item
                    .get("link")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                snippet: item
                    .get("snippet")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        assert!(SerperProvider::endpoint(SearchType::Web).ends_with("/search"));
        assert!(SerperProvider::endpoint(SearchType::News).ends_with("/news"));
        assert_eq!(SerperProvider::result_field(SearchType::Web), "organic");
        assert_eq!(SerperProvider::result_field(SearchType::News), "news");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_internal_error() {
        let provider = SerperProvider::new(None);
        let err = provider
            .search("rust web scraping", 5, SearchType::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
    }
}
