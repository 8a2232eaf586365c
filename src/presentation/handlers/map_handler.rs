// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::job_response::JobSubmittedDto;
use crate::application::dto::map_request::MapRequestDto;
use crate::domain::models::api_key::Scope;
use crate::domain::models::job::JobType;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::auth_middleware::{require_scope, AuthContext};
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use crate::queue::job_queue::JobQueue;
use crate::utils::url_utils;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use validator::Validate;

/// X-Idempotency-Key请求头名
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// 读取可选的幂等键请求头
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 组装202提交响应；幂等命中时附带标记头
pub fn submitted_response(
    job_id: uuid::Uuid,
    status: String,
    request_id: String,
    reused: bool,
) -> Response {
    let mut response = (
        StatusCode::ACCEPTED,
        Json(JobSubmittedDto {
            job_id,
            status,
            request_id,
        }),
    )
        .into_response();
    if reused {
        response
            .headers_mut()
            .insert("x-idempotency-hit", HeaderValue::from_static("true"));
    }
    response
}

/// 站点地图作业提交处理器
///
/// POST /api/v1/map：校验与种子URL的SSRF前置检查同步完成，
/// 其余在作业中异步执行，始终返回202
pub async fn create_map(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<MapRequestDto>,
) -> Result<Response, ApiError> {
    require_scope(&auth, Scope::Map, &request_id)?;
    body.validate()
        .map_err(|e| ApiError::validation(e.to_string(), &request_id))?;

    // 提交前挡掉显而易见的坏种子，避免排一个注定失败的作业
    url_utils::normalize_and_validate(&body.url, None)
        .await
        .map_err(|e| ApiError::from_pipeline(e, &request_id))?;

    let params = serde_json::to_value(&body)
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?;

    let (job, reused) = ctx
        .queue
        .submit(
            auth.api_key.id,
            JobType::Map,
            params,
            idempotency_key(&headers),
        )
        .await
        .map_err(|e| ApiError::from_queue(e, &request_id))?;

    Ok(submitted_response(
        job.id,
        job.status.to_string(),
        request_id,
        reused,
    ))
}
