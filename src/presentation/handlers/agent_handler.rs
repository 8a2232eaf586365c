// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::agent_request::AgentExtractRequestDto;
use crate::domain::models::api_key::Scope;
use crate::domain::models::job::JobType;
use crate::presentation::errors::ApiError;
use crate::presentation::handlers::map_handler::{idempotency_key, submitted_response};
use crate::presentation::middleware::auth_middleware::{require_scope, AuthContext};
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use crate::queue::job_queue::JobQueue;
use crate::utils::url_utils;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::{Extension, Json};
use validator::Validate;

/// LLM结构化提取作业提交处理器
///
/// POST /api/v1/agent/extract：202提交，提取在作业中异步执行
pub async fn agent_extract(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<AgentExtractRequestDto>,
) -> Result<Response, ApiError> {
    require_scope(&auth, Scope::Agent, &request_id)?;
    body.validate()
        .map_err(|e| ApiError::validation(e.to_string(), &request_id))?;

    if let Some(schema) = &body.schema_definition {
        if !schema.is_object() {
            return Err(ApiError::validation(
                "schema_definition must be a JSON schema object",
                &request_id,
            ));
        }
    }

    url_utils::normalize_and_validate(&body.url, None)
        .await
        .map_err(|e| ApiError::from_pipeline(e, &request_id))?;

    let params = serde_json::to_value(&body)
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?;

    let (job, reused) = ctx
        .queue
        .submit(
            auth.api_key.id,
            JobType::AgentExtract,
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
