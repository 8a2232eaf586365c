// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::Job;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use uuid::Uuid;

/// 作业提交响应DTO
#[derive(Debug, Clone, Serialize)]
pub struct JobSubmittedDto {
    /// 作业ID
    pub job_id: Uuid,
    /// 当前状态
    pub status: String,
    /// 请求追踪ID
    pub request_id: String,
}

/// 作业错误DTO
#[derive(Debug, Clone, Serialize)]
pub struct JobErrorDto {
    /// 错误码
    pub code: String,
    /// 错误消息
    pub message: Option<String>,
}

/// 作业状态信封DTO
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusDto {
    /// 作业ID
    pub job_id: Uuid,
    /// 作业类型
    pub job_type: String,
    /// 当前状态
    pub status: String,
    /// 已发现页面数
    pub pages_discovered: i32,
    /// 页面总数
    pub pages_total: Option<i32>,
    /// 首个致命错误
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorDto>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 开始时间
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 终态时间
    pub completed_at: Option<DateTime<FixedOffset>>,
    /// 请求追踪ID
    pub request_id: String,
}

impl JobStatusDto {
    /// 由作业实体组装状态信封
    pub fn from_job(job: &Job, request_id: String) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.to_string(),
            status: job.status.to_string(),
            pages_discovered: job.pages_discovered,
            pages_total: job.pages_total,
            error: job.error_code.as_ref().map(|code| JobErrorDto {
                code: code.clone(),
                message: job.error_message.clone(),
            }),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            request_id,
        }
    }
}
