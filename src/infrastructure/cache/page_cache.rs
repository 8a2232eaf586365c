// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::Page;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::page_repository::PageRepository;
use crate::utils::url_utils;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// 命中的缓存层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLayer {
    /// 进程内LRU层
    Memory,
    /// 持久化页面表
    Page,
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CacheLayer::Memory => write!(f, "memory"),
            CacheLayer::Page => write!(f, "page"),
        }
    }
}

/// 缓存探测结果
#[derive(Debug, Clone)]
pub enum Probe {
    /// 命中
    Hit {
        /// 缓存的页面
        page: Box<Page>,
        /// 命中层
        layer: CacheLayer,
    },
    /// 未命中
    Miss,
}

/// 页面缓存
///
/// 持久化页面表之前加一层有界的进程内LRU；两层保持一致：
/// store写穿两层，探测命中持久层时回填内存层。写入后写者胜
pub struct PageCache {
    /// 持久化仓库
    repository: Arc<dyn PageRepository>,
    /// 进程内LRU层
    memory: Mutex<LruCache<String, Page>>,
}

impl PageCache {
    /// 创建新的页面缓存
    ///
    /// # 参数
    ///
    /// * `repository` - 持久化页面仓库
    /// * `memory_capacity` - 内存层容量（条数）
    pub fn new(repository: Arc<dyn PageRepository>, memory_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(memory_capacity.max(1)).unwrap();
        Self {
            repository,
            memory: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 探测缓存
    ///
    /// 命中条件：行存在、fetched_at未超出ttl、非强制刷新，且该行
    /// 记录的是成功的提取（负向结果不参与命中，等待下次刷新覆盖）
    ///
    /// # 参数
    ///
    /// * `url_hash` - 缓存键
    /// * `ttl` - 有效期；None表示不设上限
    /// * `force_refresh` - 强制刷新跳过缓存
    pub async fn probe(
        &self,
        url_hash: &str,
        ttl: Option<Duration>,
        force_refresh: bool,
    ) -> Result<Probe, RepositoryError> {
        if force_refresh {
            return Ok(Probe::Miss);
        }

        if let Some(ttl) = ttl {
            if ttl.is_zero() {
                return Ok(Probe::Miss);
            }
        }

        {
            let mut memory = self.memory.lock();
            if let Some(page) = memory.get(url_hash) {
                if Self::is_fresh(page, ttl) && Self::is_servable(page) {
                    return Ok(Probe::Hit {
                        page: Box::new(page.clone()),
                        layer: CacheLayer::Memory,
                    });
                }
                memory.pop(url_hash);
            }
        }

        let Some(page) = self.repository.find_by_url_hash(url_hash).await? else {
            return Ok(Probe::Miss);
        };

        if !Self::is_fresh(&page, ttl) || !Self::is_servable(&page) {
            return Ok(Probe::Miss);
        }

        self.memory.lock().put(url_hash.to_string(), page.clone());
        Ok(Probe::Hit {
            page: Box::new(page),
            layer: CacheLayer::Page,
        })
    }

    /// 写入页面
    ///
    /// 从规范化Markdown计算content_hash后写穿持久层与内存层
    pub async fn store(&self, mut page: Page) -> Result<Page, RepositoryError> {
        page.content_hash = page
            .markdown
            .as_deref()
            .map(url_utils::sha256_hex);

        let stored = self.repository.upsert(&page).await?;
        self.memory
            .lock()
            .put(stored.url_hash.clone(), stored.clone());
        Ok(stored)
    }

    /// 按content_hash查找既有产物（跨URL内容复用）
    pub async fn lookup_by_content(
        &self,
        content_hash: &str,
    ) -> Result<Option<Page>, RepositoryError> {
        self.repository.find_by_content_hash(content_hash).await
    }

    fn is_fresh(page: &Page, ttl: Option<Duration>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(page.fetched_at);
                age.num_seconds() >= 0 && (age.num_seconds() as u64) <= ttl.as_secs()
            }
        }
    }

    fn is_servable(page: &Page) -> bool {
        page.error_code.is_none() && page.markdown.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;

    /// 内存页面仓库（测试替身）
    #[derive(Default)]
    struct InMemoryPageRepo {
        rows: DashMap<String, Page>,
    }

    #[async_trait]
    impl PageRepository for InMemoryPageRepo {
        async fn upsert(&self, page: &Page) -> Result<Page, RepositoryError> {
            let stored = match self.rows.get(&page.url_hash) {
                Some(existing) => {
                    let mut replacement = page.clone();
                    replacement.id = existing.id;
                    replacement
                }
                None => page.clone(),
            };
            self.rows.insert(page.url_hash.clone(), stored.clone());
            Ok(stored)
        }

        async fn find_by_url_hash(&self, url_hash: &str) -> Result<Option<Page>, RepositoryError> {
            Ok(self.rows.get(url_hash).map(|p| p.clone()))
        }

        async fn find_by_content_hash(
            &self,
            content_hash: &str,
        ) -> Result<Option<Page>, RepositoryError> {
            Ok(self
                .rows
                .iter()
                .find(|entry| entry.content_hash.as_deref() == Some(content_hash))
                .map(|entry| entry.clone()))
        }
    }

    fn sample_page(url_hash: &str) -> Page {
        let mut page = Page::new(
            "https://example.com/".into(),
            "https://example.com/".into(),
            url_hash.into(),
        );
        page.markdown = Some("# Hello".into());
        page.status_code = Some(200);
        page
    }

    fn cache() -> (PageCache, Arc<InMemoryPageRepo>) {
        let repo = Arc::new(InMemoryPageRepo::default());
        (PageCache::new(repo.clone(), 16), repo)
    }

    #[tokio::test]
    async fn test_miss_then_hit_after_store() {
        let (cache, _) = cache();
        let ttl = Some(Duration::from_secs(3600));

        assert!(matches!(cache.probe("h1", ttl, false).await.unwrap(), Probe::Miss));

        cache.store(sample_page("h1")).await.unwrap();

        match cache.probe("h1", ttl, false).await.unwrap() {
            Probe::Hit { page, layer } => {
                assert_eq!(page.url_hash, "h1");
                // store写穿内存层，第一次探测即命中内存层
                assert_eq!(layer, CacheLayer::Memory);
            }
            Probe::Miss => panic!("expected hit"),
        }
    }

    #[tokio::test]
    async fn test_persistent_tier_backfills_memory() {
        let (cache, repo) = cache();
        repo.upsert(&sample_page("h2")).await.unwrap();

        match cache.probe("h2", None, false).await.unwrap() {
            Probe::Hit { layer, .. } => assert_eq!(layer, CacheLayer::Page),
            Probe::Miss => panic!("expected hit"),
        }
        // 第二次命中内存层
        match cache.probe("h2", None, false).await.unwrap() {
            Probe::Hit { layer, .. } => assert_eq!(layer, CacheLayer::Memory),
            Probe::Miss => panic!("expected hit"),
        }
    }

    #[tokio::test]
    async fn test_force_refresh_and_zero_ttl_miss() {
        let (cache, _) = cache();
        cache.store(sample_page("h3")).await.unwrap();

        assert!(matches!(
            cache
                .probe("h3", Some(Duration::from_secs(3600)), true)
                .await
                .unwrap(),
            Probe::Miss
        ));
        assert!(matches!(
            cache
                .probe("h3", Some(Duration::ZERO), false)
                .await
                .unwrap(),
            Probe::Miss
        ));
    }

    #[tokio::test]
    async fn test_expired_row_misses_but_unbounded_ttl_hits() {
        let (cache, repo) = cache();
        let mut page = sample_page("h4");
        page.fetched_at = (Utc::now() - chrono::Duration::hours(3)).into();
        repo.upsert(&page).await.unwrap();

        assert!(matches!(
            cache
                .probe("h4", Some(Duration::from_secs(3600)), false)
                .await
                .unwrap(),
            Probe::Miss
        ));
        assert!(matches!(
            cache.probe("h4", None, false).await.unwrap(),
            Probe::Hit { .. }
        ));
    }

    #[tokio::test]
    async fn test_negative_rows_do_not_serve() {
        let (cache, repo) = cache();
        let mut page = sample_page("h5");
        page.markdown = None;
        page.error_code = Some("FETCH_TIMEOUT".into());
        repo.upsert(&page).await.unwrap();

        assert!(matches!(
            cache.probe("h5", None, false).await.unwrap(),
            Probe::Miss
        ));
    }

    #[tokio::test]
    async fn test_store_computes_content_hash() {
        let (cache, _) = cache();
        let stored = cache.store(sample_page("h6")).await.unwrap();
        assert_eq!(
            stored.content_hash.as_deref(),
            Some(url_utils::sha256_hex("# Hello").as_str())
        );

        let found = cache
            .lookup_by_content(stored.content_hash.as_deref().unwrap())
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
