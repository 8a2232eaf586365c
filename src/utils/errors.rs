// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 管道错误码
///
/// 贯穿抓取、渲染、提取与作业各层的统一错误码，
/// 每个错误码携带对外HTTP状态与是否可重试标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 无法解析的URL
    InvalidUrl,
    /// 不支持的URL scheme
    UnsupportedScheme,
    /// SSRF防护拦截
    SsrfBlocked,
    /// robots.txt拒绝
    RobotsBlocked,
    /// 超出速率限制
    RateLimited,
    /// 请求参数校验失败
    ValidationError,
    /// 未认证
    Unauthorized,
    /// 权限不足
    Forbidden,
    /// 资源不存在
    NotFound,
    /// 作业尚未进入终态
    JobNotReady,
    /// 抓取超时
    FetchTimeout,
    /// 抓取网络错误
    FetchError,
    /// 上游返回不可重试的4xx
    UpstreamHttpError,
    /// 无头渲染失败
    RenderError,
    /// LLM调用超时
    LlmTimeout,
    /// LLM提供商错误
    LlmProviderError,
    /// LLM输出经重试后仍不合法
    LlmOutputInvalid,
    /// 作业队列已满
    QueueFull,
    /// 工作器失联导致作业失败
    WorkerStalled,
    /// 内部错误
    InternalError,
}

impl ErrorCode {
    /// 错误码的线上表示 (SCREAMING_SNAKE_CASE)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED",
            ErrorCode::RobotsBlocked => "ROBOTS_BLOCKED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::JobNotReady => "JOB_NOT_READY",
            ErrorCode::FetchTimeout => "FETCH_TIMEOUT",
            ErrorCode::FetchError => "FETCH_ERROR",
            ErrorCode::UpstreamHttpError => "UPSTREAM_HTTP_ERROR",
            ErrorCode::RenderError => "RENDER_ERROR",
            ErrorCode::LlmTimeout => "LLM_TIMEOUT",
            ErrorCode::LlmProviderError => "LLM_PROVIDER_ERROR",
            ErrorCode::LlmOutputInvalid => "LLM_OUTPUT_INVALID",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::WorkerStalled => "WORKER_STALLED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// 映射到对外HTTP状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidUrl | ErrorCode::UnsupportedScheme | ErrorCode::ValidationError => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::SsrfBlocked | ErrorCode::RobotsBlocked | ErrorCode::Forbidden => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::JobNotReady => StatusCode::CONFLICT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::FetchTimeout | ErrorCode::LlmTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::FetchError
            | ErrorCode::UpstreamHttpError
            | ErrorCode::RenderError
            | ErrorCode::LlmProviderError
            | ErrorCode::LlmOutputInvalid => StatusCode::BAD_GATEWAY,
            ErrorCode::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::WorkerStalled | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited
                | ErrorCode::FetchTimeout
                | ErrorCode::FetchError
                | ErrorCode::LlmTimeout
                | ErrorCode::LlmProviderError
                | ErrorCode::QueueFull
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVALID_URL" => Ok(ErrorCode::InvalidUrl),
            "UNSUPPORTED_SCHEME" => Ok(ErrorCode::UnsupportedScheme),
            "SSRF_BLOCKED" => Ok(ErrorCode::SsrfBlocked),
            "ROBOTS_BLOCKED" => Ok(ErrorCode::RobotsBlocked),
            "RATE_LIMITED" => Ok(ErrorCode::RateLimited),
            "VALIDATION_ERROR" => Ok(ErrorCode::ValidationError),
            "UNAUTHORIZED" => Ok(ErrorCode::Unauthorized),
            "FORBIDDEN" => Ok(ErrorCode::Forbidden),
            "NOT_FOUND" => Ok(ErrorCode::NotFound),
            "JOB_NOT_READY" => Ok(ErrorCode::JobNotReady),
            "FETCH_TIMEOUT" => Ok(ErrorCode::FetchTimeout),
            "FETCH_ERROR" => Ok(ErrorCode::FetchError),
            "UPSTREAM_HTTP_ERROR" => Ok(ErrorCode::UpstreamHttpError),
            "RENDER_ERROR" => Ok(ErrorCode::RenderError),
            "LLM_TIMEOUT" => Ok(ErrorCode::LlmTimeout),
            "LLM_PROVIDER_ERROR" => Ok(ErrorCode::LlmProviderError),
            "LLM_OUTPUT_INVALID" => Ok(ErrorCode::LlmOutputInvalid),
            "QUEUE_FULL" => Ok(ErrorCode::QueueFull),
            "WORKER_STALLED" => Ok(ErrorCode::WorkerStalled),
            "INTERNAL_ERROR" => Ok(ErrorCode::InternalError),
            _ => Err(()),
        }
    }
}

/// 管道错误
///
/// 抓取管道内部传递的类型化错误，可克隆以便单飞共享
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct PipelineError {
    /// 错误码
    pub code: ErrorCode,
    /// 人类可读的错误消息
    pub message: String,
}

impl PipelineError {
    /// 创建新的管道错误
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
