// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::usecases::scrape_page::ScrapePageUseCase;
use crate::config::settings::Settings;
use crate::domain::services::search_service::SearchProvider;
use crate::infrastructure::repositories::api_key_repo_impl::ApiKeyRepositoryImpl;
use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use crate::presentation::handlers::{
    admin_handler, agent_handler, job_handler, map_handler, scrape_handler, search_handler,
};
use crate::presentation::middleware::admin_middleware::{admin_middleware, AdminState};
use crate::presentation::middleware::auth_middleware::{auth_middleware, AuthState};
use crate::presentation::middleware::rate_limit_middleware::RateLimiter;
use crate::presentation::middleware::request_id_middleware::request_id_middleware;
use crate::queue::job_queue::PostgresJobQueue;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;

/// 应用上下文
///
/// 进程级全局组件的句柄集合，经Extension注入各处理器
#[derive(Clone)]
pub struct AppContext {
    /// 应用配置
    pub settings: Arc<Settings>,
    /// 抓取协调器
    pub scraper: Arc<ScrapePageUseCase>,
    /// 作业队列
    pub queue: Arc<PostgresJobQueue<JobRepositoryImpl>>,
    /// API密钥仓库
    pub api_key_repository: Arc<ApiKeyRepositoryImpl>,
    /// 搜索提供商
    pub search_provider: Arc<dyn SearchProvider>,
    /// 速率限制器
    pub rate_limiter: Arc<RateLimiter>,
}

/// 健康检查
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// 版本信息
pub async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 构建HTTP路由
///
/// 公开路由（健康与版本）、X-API-Key保护的数据路由与
/// X-Admin-Key保护的管理路由，请求ID中间件在最外层
pub fn build_router(ctx: AppContext) -> Router {
    let auth_state = AuthState {
        api_key_repository: ctx.api_key_repository.clone(),
        rate_limiter: ctx.rate_limiter.clone(),
        rate_limiting_enabled: ctx.settings.rate_limiting.enabled,
        key_hash_secret: ctx.settings.auth.key_hash_secret.clone(),
    };
    let admin_state = AdminState {
        admin_key: ctx.settings.admin.admin_key.clone(),
    };

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/version", get(version));

    let data_routes = Router::new()
        .route("/api/v1/scrape", post(scrape_handler::scrape))
        .route("/api/v1/map", post(map_handler::create_map))
        .route("/api/v1/search", post(search_handler::search))
        .route("/api/v1/agent/extract", post(agent_handler::agent_extract))
        .route(
            "/api/v1/jobs/{id}",
            get(job_handler::get_job).delete(job_handler::cancel_job),
        )
        .route("/api/v1/jobs/{id}/results", get(job_handler::get_job_results))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/keys",
            post(admin_handler::create_key).get(admin_handler::list_keys),
        )
        .route(
            "/api/v1/admin/keys/{id}",
            get(admin_handler::get_key)
                .patch(admin_handler::update_key)
                .delete(admin_handler::revoke_key),
        )
        .layer(axum::middleware::from_fn_with_state(
            admin_state,
            admin_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(data_routes)
        .merge(admin_routes)
        .layer(Extension(ctx))
        .layer(axum::middleware::from_fn(request_id_middleware))
}
