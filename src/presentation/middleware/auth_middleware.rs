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

use crate::domain::models::api_key::{ApiKey, Scope};
use crate::domain::repositories::api_key_repository::ApiKeyRepository;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::rate_limit_middleware::{RateLimitError, RateLimiter};
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::utils::errors::ErrorCode;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// X-API-Key请求头名
const API_KEY_HEADER: &str = "x-api-key";

/// 认证状态
#[derive(Clone)]
pub struct AuthState {
    /// API密钥仓库
    pub api_key_repository: Arc<dyn ApiKeyRepository>,
    /// 速率限制器
    pub rate_limiter: Arc<RateLimiter>,
    /// 是否启用速率限制
    pub rate_limiting_enabled: bool,
    /// API密钥哈希的服务端加盐密钥
    pub key_hash_secret: String,
}

/// 已认证请求的上下文
#[derive(Clone)]
pub struct AuthContext {
    /// 请求所用的API密钥
    pub api_key: ApiKey,
}

/// 认证中间件
///
/// 校验X-API-Key（按加盐哈希查库）、启用状态与速率限制，
/// 成功后把AuthContext注入请求扩展并刷新last_used_at
///
/// # 参数
///
/// * `state` - 认证状态
/// * `req` - HTTP请求
/// * `next` - 下一个中间件
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();

    debug!("AuthMiddleware processing path: {}", req.uri().path());

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(ErrorCode::Unauthorized, "Missing API key", &request_id)
        })?;

    let key_hash = ApiKey::hash_key(&state.key_hash_secret, presented);
    let api_key = match state.api_key_repository.find_by_hash(&key_hash).await {
        Ok(Some(key)) if key.is_active => key,
        Ok(_) => {
            warn!("rejected request with unknown or revoked API key");
            return Err(ApiError::new(
                ErrorCode::Unauthorized,
                "Invalid API key",
                &request_id,
            ));
        }
        Err(e) => {
            return Err(ApiError::internal(
                format!("Failed to validate API key: {}", e),
                &request_id,
            ));
        }
    };

    if state.rate_limiting_enabled {
        if let Err(RateLimitError::TooManyRequests {
            retry_after_seconds,
        }) = state
            .rate_limiter
            .check(api_key.id, api_key.rate_limit.max(0) as u32)
        {
            return Err(ApiError::new(
                ErrorCode::RateLimited,
                "API key over rate limit",
                &request_id,
            )
            .with_details(json!({
                "limit_per_minute": api_key.rate_limit,
                "retry_after_seconds": retry_after_seconds,
            })));
        }
    }

    if let Err(e) = state.api_key_repository.touch_last_used(api_key.id).await {
        // last_used_at只是观测性字段，失败不阻断请求
        debug!("failed to touch last_used_at: {}", e);
    }

    req.extensions_mut().insert(AuthContext { api_key });
    Ok(next.run(req).await)
}

/// 作用域检查
///
/// # 返回值
///
/// * `Ok(())` - 密钥持有所需作用域
/// * `Err(ApiError)` - FORBIDDEN
pub fn require_scope(
    auth: &AuthContext,
    scope: Scope,
    request_id: &str,
) -> Result<(), ApiError> {
    if auth.api_key.has_scope(scope) {
        return Ok(());
    }
    Err(ApiError::new(
        ErrorCode::Forbidden,
        "API key missing required scope",
        request_id,
    )
    .with_details(json!({
        "required_scope": scope.to_string(),
        "provided_scopes": auth
            .api_key
            .scopes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn key_with_scopes(scopes: Vec<Scope>) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            key_hash: "h".into(),
            name: "test".into(),
            scopes,
            rate_limit: 60,
            is_active: true,
            created_at: Utc::now().into(),
            last_used_at: None,
        }
    }

    #[test]
    fn test_require_scope() {
        let auth = AuthContext {
            api_key: key_with_scopes(vec![Scope::Scrape, Scope::Search]),
        };
        assert!(require_scope(&auth, Scope::Scrape, "r").is_ok());
        let err = require_scope(&auth, Scope::Admin, "r").unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
