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

use crate::utils::errors::{ErrorCode, PipelineError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 每主机并发治理器
///
/// 为每个目标主机维护一个独立的计数信号量，限制同一主机上的
/// 并发抓取数。等待者FIFO排队，被取消的等待者把位置让给下一个。
/// 进程级全局，协调器与爬虫共用同一实例
#[derive(Clone, Debug)]
pub struct HostGovernor {
    /// 每主机的信号量
    semaphores: Arc<DashMap<String, Arc<Semaphore>>>,
    /// 默认并发许可数
    default_permits: usize,
}

impl HostGovernor {
    /// 创建新的HostGovernor实例
    ///
    /// # 参数
    ///
    /// * `default_permits` - 每主机的默认并发许可数
    pub fn new(default_permits: usize) -> Self {
        Self {
            semaphores: Arc::new(DashMap::new()),
            default_permits,
        }
    }

    /// 获取指定主机的并发许可
    ///
    /// 等待超过调用方期限的请求以FETCH_TIMEOUT失败
    ///
    /// # 参数
    ///
    /// * `host` - 目标主机名
    /// * `permits_override` - 作业级并发覆盖（首次接触该主机时生效）
    /// * `deadline` - 最长等待时间
    ///
    /// # 返回值
    ///
    /// * `Ok(OwnedSemaphorePermit)` - 成功获取的许可
    /// * `Err(PipelineError)` - 等待超时
    pub async fn acquire(
        &self,
        host: &str,
        permits_override: Option<usize>,
        deadline: Duration,
    ) -> Result<OwnedSemaphorePermit, PipelineError> {
        let semaphore = self.get_or_create(host, permits_override);
        match tokio::time::timeout(deadline, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PipelineError::new(
                ErrorCode::InternalError,
                "Host semaphore closed",
            )),
            Err(_) => Err(PipelineError::new(
                ErrorCode::FetchTimeout,
                format!("Timed out waiting for a fetch slot on {}", host),
            )),
        }
    }

    fn get_or_create(&self, host: &str, permits_override: Option<usize>) -> Arc<Semaphore> {
        self.semaphores
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| {
                Arc::new(Semaphore::new(
                    permits_override.unwrap_or(self.default_permits),
                ))
            })
            .clone()
    }

    /// 指定主机当前可用的许可数（测试与指标用）
    pub fn available_permits(&self, host: &str) -> Option<usize> {
        self.semaphores
            .get(&host.to_ascii_lowercase())
            .map(|s| s.available_permits())
    }
}
