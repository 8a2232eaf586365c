// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::scrape_request::ScrapeRequestDto;
use crate::application::dto::scrape_response::ScrapeResponseDto;
use crate::application::usecases::scrape_page::ScrapeOptions;
use crate::domain::models::api_key::Scope;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::auth_middleware::{require_scope, AuthContext};
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use axum::{Extension, Json};
use std::time::Duration;
use validator::Validate;

/// 默认单次抓取期限（毫秒）
const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// 同步抓取处理器
///
/// POST /api/v1/scrape：速率限制与认证在中间件完成，这里串
/// 协调器并组装页面信封
pub async fn scrape(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<ScrapeRequestDto>,
) -> Result<Json<ScrapeResponseDto>, ApiError> {
    require_scope(&auth, Scope::Scrape, &request_id)?;
    body.validate()
        .map_err(|e| ApiError::validation(e.to_string(), &request_id))?;

    let cache_ttl = match body.cache_ttl_seconds {
        // 字段缺省走配置默认
        None => Some(Duration::from_secs(ctx.settings.cache.default_ttl_seconds)),
        // 显式null解除TTL上限
        Some(None) => None,
        Some(Some(seconds)) => Some(Duration::from_secs(seconds as u64)),
    };

    let options = ScrapeOptions {
        url: body.url.clone(),
        render_policy: body.use_playwright,
        respect_robots: body.respect_robots,
        timeout: Duration::from_millis(body.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        cache_ttl,
        force_refresh: body.force_refresh,
        host_permits_override: None,
        keep_raw_html: body.include_raw_html,
    };

    let outcome = ctx
        .scraper
        .execute(options)
        .await
        .map_err(|e| ApiError::from_pipeline(e, &request_id))?;

    Ok(Json(ScrapeResponseDto::from_outcome(
        outcome,
        body.include_links,
        body.include_raw_html,
        request_id,
    )))
}
