// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::search_request::SearchRequestDto;
use crate::application::usecases::scrape_page::ScrapeOptions;
use crate::domain::models::api_key::Scope;
use crate::domain::models::search_result::SearchResult;
use crate::domain::services::search_service::SearchProvider;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::auth_middleware::{require_scope, AuthContext};
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use axum::{Extension, Json};
use serde::Serialize;
use std::time::Duration;
use validator::Validate;

/// 搜索结果DTO（可选附带内联抓取产物）
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultDto {
    /// 排名
    pub rank: i32,
    /// 标题
    pub title: String,
    /// 结果URL
    pub url: String,
    /// 摘要
    pub snippet: Option<String>,
    /// 抓取得到的Markdown（scrape_top_n范围内）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    /// 单条抓取失败的错误码（不影响搜索本身）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_error: Option<String>,
}

/// 搜索响应DTO
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponseDto {
    /// 查询串
    pub query: String,
    /// 排名结果
    pub results: Vec<SearchResultDto>,
    /// 请求追踪ID
    pub request_id: String,
}

/// 同步搜索处理器
///
/// POST /api/v1/search：调用搜索提供商；scrape_top_n>0时对前N条
/// 内联抓取，单条失败以scrape_error内联呈报，绝不拖垮整个搜索
pub async fn search(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<SearchRequestDto>,
) -> Result<Json<SearchResponseDto>, ApiError> {
    require_scope(&auth, Scope::Search, &request_id)?;
    body.validate()
        .map_err(|e| ApiError::validation(e.to_string(), &request_id))?;

    let results = ctx
        .search_provider
        .search(&body.query, body.num_results as usize, body.search_type)
        .await
        .map_err(|e| ApiError::from_pipeline(e, &request_id))?;

    let scrape_top_n = body.scrape_top_n as usize;
    let mut dto_results = Vec::with_capacity(results.len());

    if scrape_top_n == 0 {
        dto_results.extend(results.into_iter().map(|r| plain_result(&r)));
    } else {
        let scrapes = futures::future::join_all(results.iter().enumerate().map(
            |(index, result)| {
                let scraper = ctx.scraper.clone();
                let url = result.url.clone();
                async move {
                    if index >= scrape_top_n || url.is_empty() {
                        return None;
                    }
                    Some(
                        scraper
                            .execute(ScrapeOptions {
                                url,
                                timeout: Duration::from_secs(20),
                                ..ScrapeOptions::new("")
                            })
                            .await,
                    )
                }
            },
        ))
        .await;

        for (result, scraped) in results.iter().zip(scrapes) {
            let mut dto = plain_result(result);
            match scraped {
                Some(Ok(outcome)) => dto.markdown = outcome.page.markdown,
                Some(Err(error)) => dto.scrape_error = Some(error.code.as_str().to_string()),
                None => {}
            }
            dto_results.push(dto);
        }
    }

    Ok(Json(SearchResponseDto {
        query: body.query,
        results: dto_results,
        request_id,
    }))
}

fn plain_result(result: &SearchResult) -> SearchResultDto {
    SearchResultDto {
        rank: result.rank,
        title: result.title.clone(),
        url: result.url.clone(),
        snippet: result.snippet.clone(),
        markdown: None,
        scrape_error: None,
    }
}
