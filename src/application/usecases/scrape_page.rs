// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::Page;
use crate::engines::router::AdaptiveFetcher;
use crate::engines::traits::RenderPolicy;
use crate::infrastructure::cache::page_cache::{CacheLayer, PageCache, Probe};
use crate::utils::errors::{ErrorCode, PipelineError};
use crate::utils::host_governor::HostGovernor;
use crate::utils::robots::{RobotsChecker, RobotsCheckerTrait};
use crate::utils::single_flight::SingleFlight;
use crate::utils::url_utils;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// 抓取时对目标站点表明身份的User-Agent
const ROBOTS_USER_AGENT: &str = "extractrs-bot/0.1";

/// 请求期限硬上限
const MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// 单次抓取的选项
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// 原始URL
    pub url: String,
    /// 渲染策略
    pub render_policy: RenderPolicy,
    /// 是否遵循robots.txt
    pub respect_robots: bool,
    /// 请求期限
    pub timeout: Duration,
    /// 缓存TTL；None表示不设上限
    pub cache_ttl: Option<Duration>,
    /// 强制刷新
    pub force_refresh: bool,
    /// 每主机并发覆盖（爬取作业使用）
    pub host_permits_override: Option<usize>,
    /// 是否保留原始HTML
    pub keep_raw_html: bool,
}

impl ScrapeOptions {
    /// 以默认策略构造
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            render_policy: RenderPolicy::Auto,
            respect_robots: false,
            timeout: Duration::from_secs(20),
            cache_ttl: Some(Duration::from_secs(3600)),
            force_refresh: false,
            host_permits_override: None,
            keep_raw_html: false,
        }
    }
}

/// 抓取结果
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// 页面
    pub page: Page,
    /// 是否来自缓存
    pub cached: bool,
    /// 命中的缓存层
    pub cache_layer: Option<CacheLayer>,
}

/// 抓取协调器
///
/// 将一次抓取串为：规范化与SSRF校验 → 缓存探测 → robots检查 →
/// 主机许可 → 抓取 → 提取 → 持久化。同一url_hash上的并发请求
/// 通过单飞共享一次在途的抓取与提取（包括错误结果）
pub struct ScrapePageUseCase {
    /// 页面缓存
    cache: Arc<PageCache>,
    /// Robots检查器
    robots: Arc<RobotsChecker>,
    /// 每主机并发治理器
    governor: Arc<HostGovernor>,
    /// 自适应抓取器
    fetcher: Arc<AdaptiveFetcher>,
    /// 每url_hash的单飞
    flight: SingleFlight<Result<Page, PipelineError>>,
}

impl ScrapePageUseCase {
    /// 创建新的抓取协调器
    pub fn new(
        cache: Arc<PageCache>,
        robots: Arc<RobotsChecker>,
        governor: Arc<HostGovernor>,
        fetcher: Arc<AdaptiveFetcher>,
    ) -> Self {
        Self {
            cache,
            robots,
            governor,
            fetcher,
            flight: SingleFlight::new(),
        }
    }

    /// 执行一次抓取
    ///
    /// # 参数
    ///
    /// * `options` - 抓取选项
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeOutcome)` - 页面与缓存标记
    /// * `Err(PipelineError)` - 类型化的管道错误
    #[instrument(skip(self, options), fields(url = %options.url))]
    pub async fn execute(&self, options: ScrapeOptions) -> Result<ScrapeOutcome, PipelineError> {
        let timeout = options.timeout.min(MAX_TIMEOUT);

        let (url, url_hash) = url_utils::normalize_and_validate(&options.url, None).await?;

        match self
            .cache
            .probe(&url_hash, options.cache_ttl, options.force_refresh)
            .await
            .map_err(internal)?
        {
            Probe::Hit { page, layer } => {
                metrics::counter!("extractrs_scrape_cache_hit_total").increment(1);
                return Ok(ScrapeOutcome {
                    page: *page,
                    cached: true,
                    cache_layer: Some(layer),
                });
            }
            Probe::Miss => {}
        }

        let work = {
            let cache = self.cache.clone();
            let robots = self.robots.clone();
            let governor = self.governor.clone();
            let fetcher = self.fetcher.clone();
            let url = url.clone();
            let url_hash = url_hash.clone();
            let options = options.clone();
            move || async move {
                Self::fetch_and_persist(cache, robots, governor, fetcher, url, url_hash, options, timeout)
                    .await
            }
        };

        let (result, _leader) = self.flight.run(&url_hash, work).await;
        let page = result?;

        Ok(ScrapeOutcome {
            page,
            cached: false,
            cache_layer: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_and_persist(
        cache: Arc<PageCache>,
        robots: Arc<RobotsChecker>,
        governor: Arc<HostGovernor>,
        fetcher: Arc<AdaptiveFetcher>,
        url: Url,
        url_hash: String,
        options: ScrapeOptions,
        timeout: Duration,
    ) -> Result<Page, PipelineError> {
        if options.respect_robots && !robots.is_allowed(&url, ROBOTS_USER_AGENT).await {
            return Err(PipelineError::new(
                ErrorCode::RobotsBlocked,
                "robots.txt disallows this URL",
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| PipelineError::new(ErrorCode::InvalidUrl, "URL is missing a host"))?
            .to_string();

        let _permit = governor
            .acquire(&host, options.host_permits_override, timeout)
            .await?;

        metrics::counter!("extractrs_fetch_total").increment(1);
        let fetched = match fetcher.fetch(&url, options.render_policy, timeout).await {
            Ok(fetched) => fetched,
            Err(engine_err) => {
                let error = engine_err.into_pipeline();
                // SSRF拦截不留痕，其余抓取失败记录负向结果供排障
                if error.code != ErrorCode::SsrfBlocked {
                    let mut negative =
                        Page::new(url.to_string(), url.to_string(), url_hash.clone());
                    negative.error_code = Some(error.code.as_str().to_string());
                    negative.error_message = Some(error.message.clone());
                    if let Err(store_err) = cache.store(negative).await {
                        tracing::warn!("failed to store negative page row: {}", store_err);
                    }
                }
                return Err(error);
            }
        };

        let canonical_url = url_utils::normalize_url(fetched.final_url.as_str(), None)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());

        // HTML解析与Markdown转换是CPU密集操作，移出请求路径
        let body = fetched.body.clone();
        let final_url = fetched.final_url.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            crate::domain::services::extraction_service::ExtractionService::extract(
                &body, &final_url,
            )
        })
        .await
        .map_err(|e| PipelineError::new(ErrorCode::InternalError, format!("extract task: {}", e)))?;

        let mut page = Page::new(url.to_string(), canonical_url, url_hash);
        page.status_code = Some(fetched.status as i32);
        page.title = extracted.title;
        page.description = extracted.description;
        page.markdown = Some(extracted.markdown);
        page.raw_html = options.keep_raw_html.then(|| fetched.body.clone());
        page.renderer = Some(fetched.renderer);
        page.links_internal = extracted.links.internal;
        page.links_external = extracted.links.external;
        page.word_count = Some(extracted.metadata.word_count);
        page.read_time_minutes = Some(extracted.metadata.read_time_minutes);
        page.fetch_duration_ms = Some(fetched.duration_ms as i32);
        page.og_image = extracted.metadata.og_image;
        page.favicon_url = extracted.metadata.favicon_url;
        page.site_name = extracted.metadata.site_name;
        page.language = extracted.metadata.language;
        page.author = extracted.metadata.author;
        page.published_at = extracted.metadata.published_at;
        page.fetched_at = Utc::now().into();

        let stored = cache.store(page).await.map_err(internal)?;
        Ok(stored)
    }
}

fn internal(err: impl std::fmt::Display) -> PipelineError {
    PipelineError::new(ErrorCode::InternalError, err.to_string())
}
