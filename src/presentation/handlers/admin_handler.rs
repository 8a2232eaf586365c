// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::api_key_request::{
    ApiKeyDto, CreateApiKeyDto, CreatedApiKeyDto, UpdateApiKeyDto,
};
use crate::domain::models::api_key::{ApiKey, Scope};
use crate::domain::repositories::api_key_repository::ApiKeyRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::presentation::errors::ApiError;
use crate::presentation::middleware::request_id_middleware::RequestId;
use crate::presentation::routes::AppContext;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;
use validator::Validate;

/// 新建密钥的默认作用域
fn default_scopes() -> Vec<Scope> {
    vec![Scope::Scrape, Scope::Map, Scope::Search, Scope::Agent]
}

fn parse_scopes(raw: &[String], request_id: &str) -> Result<Vec<Scope>, ApiError> {
    raw.iter()
        .map(|s| {
            s.parse::<Scope>().map_err(|_| {
                ApiError::validation(format!("Unknown scope '{}'", s), request_id)
            })
        })
        .collect()
}

/// 生成`sk_`前缀的明文密钥
fn generate_raw_key() -> String {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect();
    format!("sk_{}", token)
}

/// 创建API密钥
///
/// POST /api/v1/admin/keys：明文只出现在本次响应里，
/// 库中只落盘以服务端密钥加盐的哈希
pub async fn create_key(
    Extension(ctx): Extension<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<CreateApiKeyDto>,
) -> Result<(StatusCode, Json<CreatedApiKeyDto>), ApiError> {
    body.validate()
        .map_err(|e| ApiError::validation(e.to_string(), &request_id))?;

    let scopes = match &body.scopes {
        Some(raw) => parse_scopes(raw, &request_id)?,
        None => default_scopes(),
    };

    let raw_key = generate_raw_key();
    let api_key = ApiKey::new(
        ApiKey::hash_key(&ctx.settings.auth.key_hash_secret, &raw_key),
        body.name.unwrap_or_else(|| "Unnamed Key".to_string()),
        scopes,
        body.rate_limit
            .unwrap_or(ctx.settings.rate_limiting.default_rpm as i32),
    );

    let created = ctx
        .api_key_repository
        .create(&api_key)
        .await
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKeyDto {
            key: ApiKeyDto::from(&created),
            raw_key,
        }),
    ))
}

/// 列出API密钥
pub async fn list_keys(
    Extension(ctx): Extension<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Json<Vec<ApiKeyDto>>, ApiError> {
    let keys = ctx
        .api_key_repository
        .list()
        .await
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?;
    Ok(Json(keys.iter().map(ApiKeyDto::from).collect()))
}

/// 查询单个API密钥
pub async fn get_key(
    Extension(ctx): Extension<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiKeyDto>, ApiError> {
    let key = ctx
        .api_key_repository
        .find_by_id(id)
        .await
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?
        .ok_or_else(|| ApiError::not_found("API key not found", &request_id))?;
    Ok(Json(ApiKeyDto::from(&key)))
}

/// 更新API密钥
///
/// PATCH /api/v1/admin/keys/{id}：密钥创建后不可变，只有
/// is_active可以翻转；名称、限额或作用域的变更走吊销加重建
pub async fn update_key(
    Extension(ctx): Extension<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateApiKeyDto>,
) -> Result<Json<ApiKeyDto>, ApiError> {
    let mut key = ctx
        .api_key_repository
        .find_by_id(id)
        .await
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?
        .ok_or_else(|| ApiError::not_found("API key not found", &request_id))?;

    if let Some(is_active) = body.is_active {
        key.is_active = is_active;
    }

    let updated = ctx
        .api_key_repository
        .update(&key)
        .await
        .map_err(|e| ApiError::internal(e.to_string(), &request_id))?;
    Ok(Json(ApiKeyDto::from(&updated)))
}

/// 吊销API密钥
///
/// DELETE /api/v1/admin/keys/{id}：软吊销，历史数据保留
pub async fn revoke_key(
    Extension(ctx): Extension<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.api_key_repository
        .deactivate(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => ApiError::not_found("API key not found", &request_id),
            other => ApiError::internal(other.to_string(), &request_id),
        })
        .map(|_| StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_raw_key_shape() {
        let key = generate_raw_key();
        assert!(key.starts_with("sk_"));
        assert_eq!(key.len(), 3 + 43);
        assert_ne!(generate_raw_key(), generate_raw_key());
    }

    #[test]
    fn test_parse_scopes() {
        let parsed = parse_scopes(&["scrape".into(), "admin".into()], "r").unwrap();
        assert_eq!(parsed, vec![Scope::Scrape, Scope::Admin]);
        assert!(parse_scopes(&["root".into()], "r").is_err());
    }
}
