// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;

/// 单飞执行器
///
/// 将同一键上的并发请求合并到一次底层计算：首个调用者插入并启动
/// 工作，后续调用者订阅同一个future并收到相同结果（包括错误）。
/// 条目在计算完成后移除
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    inflight: DashMap<String, Shared<BoxFuture<'static, T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// 创建新的单飞执行器
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// 在给定键上执行或加入一次计算
    ///
    /// # 参数
    ///
    /// * `key` - 合并键
    /// * `work` - 仅当本调用者是首个调用者时才会被执行的工作
    ///
    /// # 返回值
    ///
    /// 计算结果与本调用者是否为发起者的标记
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        // entry锁定分片以保证只有一个调用者能插入；不得跨await持有
        let (shared, leader) = match self.inflight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let shared = work().boxed().shared();
                e.insert(shared.clone());
                (shared, true)
            }
        };

        let result = shared.await;

        if leader {
            self.inflight.remove(key);
        }

        (result, leader)
    }

    /// 当前在途计算数量
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// 是否没有在途计算
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u64>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flight = flight.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                let (value, _) = flight
                    .run("same-key", move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42u64
                    })
                    .await;
                value
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight = SingleFlight::<usize>::new();
        let (a, _) = flight.run("a", || async { 1 }).await;
        let (b, _) = flight.run("b", || async { 2 }).await;
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_entry_removed_after_completion() {
        let flight = SingleFlight::<()>::new();
        flight.run("k", || async {}).await;
        assert!(flight.is_empty());
        // 完成后同一键重新执行
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        flight
            .run("k", move || async move {
                ran2.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
