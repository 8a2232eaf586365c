// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 管理鉴权中间件
pub mod admin_middleware;

/// API密钥认证中间件
pub mod auth_middleware;

/// 速率限制
pub mod rate_limit_middleware;

/// 请求追踪ID中间件
pub mod request_id_middleware;
