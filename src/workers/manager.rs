// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::workers::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 关闭时等待在途工作的宽限期
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 工作管理器
///
/// 持有全部后台工作器：启动时为每个工作器spawn一个任务，
/// 关闭时翻转watch信号并在宽限期内排空，逾期任务被中止
pub struct WorkerManager {
    workers: Vec<Arc<dyn Worker>>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    /// 创建新的工作管理器
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            workers: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
        }
    }

    /// 注册一个工作器
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.push(worker);
    }

    /// 启动全部已注册的工作器
    pub fn start(&mut self) {
        for worker in &self.workers {
            let worker = worker.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            info!("starting worker: {}", worker.name());
            let handle = tokio::spawn(async move {
                worker.run(shutdown_rx).await;
            });
            self.handles.push(handle);
        }
    }

    /// 优雅关闭
    ///
    /// 发出关闭信号并在宽限期内等待每个工作器退出
    pub async fn shutdown(&mut self) {
        info!("shutting down {} worker(s)...", self.handles.len());
        let _ = self.shutdown_tx.send(true);

        for mut handle in self.handles.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("worker did not stop within grace period, aborting");
                    handle.abort();
                }
            }
        }
        info!("workers stopped");
    }
}
