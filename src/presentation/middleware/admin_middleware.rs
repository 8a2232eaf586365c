// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::presentation::errors::ApiError;
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::utils::errors::ErrorCode;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// X-Admin-Key请求头名
const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// 管理接口状态
#[derive(Clone)]
pub struct AdminState {
    /// 共享管理密钥
    pub admin_key: String,
}

/// 管理鉴权中间件
///
/// 管理路径只认X-Admin-Key共享密钥
pub async fn admin_middleware(
    State(state): State<AdminState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();

    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented.is_empty() || presented != state.admin_key {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "Invalid or missing admin key",
            &request_id,
        ));
    }

    Ok(next.run(req).await)
}
