// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::JobRepository;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 回收巡检间隔
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// 租约回收工作器
///
/// 周期性扫描心跳超过租约的running作业：首次失联重新入队，
/// 二次失联按WORKER_STALLED失败。崩溃恢复就是这次扫描本身
pub struct ReaperWorker {
    /// 作业仓库
    job_repository: Arc<dyn JobRepository>,
    /// 作业租约
    lease: chrono::Duration,
}

impl ReaperWorker {
    /// 创建新的回收工作器实例
    ///
    /// # 参数
    ///
    /// * `job_repository` - 作业仓库
    /// * `lease_seconds` - 租约时长（秒）
    pub fn new(job_repository: Arc<dyn JobRepository>, lease_seconds: i64) -> Self {
        Self {
            job_repository,
            lease: chrono::Duration::seconds(lease_seconds),
        }
    }

    async fn sweep(&self) {
        match self.job_repository.reap_stalled(self.lease).await {
            Ok(outcome) => {
                if outcome.requeued > 0 || outcome.stalled > 0 {
                    warn!(
                        "reaper requeued {} job(s), failed {} stalled job(s)",
                        outcome.requeued, outcome.stalled
                    );
                    metrics::counter!("extractrs_jobs_requeued_total")
                        .increment(outcome.requeued);
                    metrics::counter!("extractrs_jobs_stalled_total")
                        .increment(outcome.stalled);
                }
            }
            Err(e) => error!("reaper sweep failed: {}", e),
        }
    }
}

#[async_trait]
impl Worker for ReaperWorker {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Reaper worker started (lease {}s)", self.lease.num_seconds());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(REAP_INTERVAL) => self.sweep().await,
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("Reaper worker stopped");
    }

    fn name(&self) -> &str {
        "reaper-worker"
    }
}
