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

use crate::utils::errors::ErrorCode;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 作业实体
///
/// 表示一个后台工作单元（站点地图爬取或LLM结构化提取）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 作业唯一标识符
    pub id: Uuid,
    /// 所属API密钥ID
    pub api_key_id: Uuid,
    /// 作业类型
    pub job_type: JobType,
    /// 作业状态
    pub status: JobStatus,
    /// 输入参数
    pub input_params: serde_json::Value,
    /// 幂等键（存在时唯一）
    pub idempotency_key: Option<String>,
    /// 终态结果
    pub result: Option<serde_json::Value>,
    /// 首个致命错误码
    pub error_code: Option<String>,
    /// 错误消息
    pub error_message: Option<String>,
    /// 已发现页面数
    pub pages_discovered: i32,
    /// 页面总数（爬取终止或max_pages生效后可知）
    pub pages_total: Option<i32>,
    /// 工作器最近心跳时间
    pub heartbeat_at: Option<DateTime<FixedOffset>>,
    /// 租约回收次数
    pub requeue_count: i32,
    /// 协作取消标记
    pub cancel_requested: bool,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 开始执行时间
    pub started_at: Option<DateTime<FixedOffset>>,
    /// 终态时间
    pub completed_at: Option<DateTime<FixedOffset>>,
}

/// 作业类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// 站点地图爬取
    #[default]
    Map,
    /// LLM结构化提取
    AgentExtract,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobType::Map => write!(f, "map"),
            JobType::AgentExtract => write!(f, "agent_extract"),
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "map" => Ok(JobType::Map),
            "agent_extract" => Ok(JobType::AgentExtract),
            _ => Err(()),
        }
    }
}

/// 作业状态枚举
///
/// 状态机：queued → running → {completed | failed | cancelled}，
/// 终态粘滞
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已入队
    #[default]
    Queued,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
    /// 已取消
    Cancelled,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition")]
    InvalidStateTransition,
}

impl Job {
    /// 创建一个新的排队作业
    ///
    /// # 参数
    ///
    /// * `api_key_id` - 所属API密钥ID
    /// * `job_type` - 作业类型
    /// * `input_params` - 输入参数
    /// * `idempotency_key` - 可选幂等键
    pub fn new(
        api_key_id: Uuid,
        job_type: JobType,
        input_params: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_key_id,
            job_type,
            status: JobStatus::Queued,
            input_params,
            idempotency_key,
            result: None,
            error_code: None,
            error_message: None,
            pages_discovered: 0,
            pages_total: None,
            heartbeat_at: None,
            requeue_count: 0,
            cancel_requested: false,
            created_at: Utc::now().into(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 启动作业
    ///
    /// 将作业状态从Queued变更为Running
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Queued => {
                self.status = JobStatus::Running;
                let now: DateTime<FixedOffset> = Utc::now().into();
                self.started_at = Some(now);
                self.heartbeat_at = Some(now);
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成作业并写入结果
    pub fn complete(mut self, result: serde_json::Value) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Completed;
                self.result = Some(result);
                self.completed_at = Some(Utc::now().into());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记作业失败
    pub fn fail(mut self, code: ErrorCode, message: impl Into<String>) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Queued | JobStatus::Running => {
                self.status = JobStatus::Failed;
                self.error_code = Some(code.as_str().to_string());
                self.error_message = Some(message.into());
                self.completed_at = Some(Utc::now().into());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 取消作业
    pub fn cancel(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Queued | JobStatus::Running => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(Utc::now().into());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }
}
