// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::job_queue::QueueError;
use crate::utils::errors::{ErrorCode, PipelineError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// 应用错误类型
///
/// 所有对外错误统一封装为
/// `{"error": {"code", "message", "request_id", "details"}}`，
/// HTTP状态由错误码决定
#[derive(Debug)]
pub struct ApiError {
    /// 错误码
    pub code: ErrorCode,
    /// 人类可读的错误消息
    pub message: String,
    /// 请求追踪ID
    pub request_id: String,
    /// 结构化细节
    pub details: Value,
}

impl ApiError {
    /// 创建新的应用错误
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: request_id.into(),
            details: json!({}),
        }
    }

    /// 附加结构化细节
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// 由管道错误组装
    pub fn from_pipeline(error: PipelineError, request_id: impl Into<String>) -> Self {
        Self::new(error.code, error.message, request_id)
    }

    /// 由队列错误组装
    pub fn from_queue(error: QueueError, request_id: impl Into<String>) -> Self {
        match error {
            QueueError::Full => Self::new(
                ErrorCode::QueueFull,
                "Job queue is at capacity, retry later",
                request_id,
            ),
            QueueError::Repository(e) => {
                Self::new(ErrorCode::InternalError, e.to_string(), request_id)
            }
        }
    }

    /// 请求体校验失败
    pub fn validation(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message, request_id)
    }

    /// 资源不存在
    pub fn not_found(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message, request_id)
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message, request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status: StatusCode = self.code.http_status();
        let body = Json(json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "request_id": self.request_id,
                "details": self.details,
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let error = ApiError::new(ErrorCode::SsrfBlocked, "blocked", "req-1")
            .with_details(json!({"url": "http://127.0.0.1/"}));
        assert_eq!(error.code.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(error.request_id, "req-1");
        assert_eq!(error.details["url"], "http://127.0.0.1/");
    }

    #[test]
    fn test_queue_full_maps_to_503() {
        let error = ApiError::from_queue(QueueError::Full, "req-2");
        assert_eq!(error.code, ErrorCode::QueueFull);
        assert_eq!(error.code.http_status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
