// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::job_response::JobStatusDto;
use crate::domain::models::job::Job;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::auth_middleware::AuthContext;
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use crate::queue::job_queue::JobQueue;
use crate::utils::errors::ErrorCode;
use axum::extract::Path;
use axum::{Extension, Json};
use serde_json::json;
use uuid::Uuid;

/// 查找属于当前密钥的作业；跨租户探测一律按不存在处理
async fn owned_job(
    ctx: &AppContext,
    auth: &AuthContext,
    id: Uuid,
    request_id: &str,
) -> Result<Job, ApiError> {
    let job = ctx
        .queue
        .status(id)
        .await
        .map_err(|e| ApiError::from_queue(e, request_id))?;
    match job {
        Some(job) if job.api_key_id == auth.api_key.id => Ok(job),
        _ => Err(ApiError::not_found("Job not found", request_id)),
    }
}

/// 作业状态查询处理器
///
/// GET /api/v1/jobs/{id}：只读
pub async fn get_job(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusDto>, ApiError> {
    let job = owned_job(&ctx, &auth, id, &request_id).await?;
    Ok(Json(JobStatusDto::from_job(&job, request_id)))
}

/// 作业结果查询处理器
///
/// GET /api/v1/jobs/{id}/results：终态前返回409；
/// 进入终态后结果载荷不再变化
pub async fn get_job_results(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = owned_job(&ctx, &auth, id, &request_id).await?;

    if !job.status.is_terminal() {
        return Err(ApiError::new(
            ErrorCode::JobNotReady,
            "Job has not reached a terminal state yet",
            &request_id,
        )
        .with_details(json!({"status": job.status.to_string()})));
    }

    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status.to_string(),
        "result": job.result,
        "error": job.error_code.map(|code| json!({
            "code": code,
            "message": job.error_message,
        })),
        "request_id": request_id,
    })))
}

/// 作业取消处理器
///
/// DELETE /api/v1/jobs/{id}：排队作业立即终态，运行中作业
/// 置协作取消标记；终态作业不受影响
pub async fn cancel_job(
    Extension(ctx): Extension<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusDto>, ApiError> {
    owned_job(&ctx, &auth, id, &request_id).await?;

    let job = ctx
        .queue
        .cancel(id)
        .await
        .map_err(|e| ApiError::from_queue(e, &request_id))?
        .ok_or_else(|| ApiError::not_found("Job not found", &request_id))?;

    Ok(Json(JobStatusDto::from_job(&job, request_id)))
}
