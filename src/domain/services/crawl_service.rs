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

use crate::application::usecases::scrape_page::{ScrapeOptions, ScrapePageUseCase};
use crate::domain::models::event::{Event, EventLevel};
use crate::domain::repositories::event_repository::EventRepository;
use crate::domain::repositories::job_repository::JobRepository;
use crate::engines::traits::RenderPolicy;
use crate::utils::errors::{ErrorCode, PipelineError};
use crate::utils::url_utils;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// 爬取配置
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// 种子URL
    pub seed_url: String,
    /// 最大深度（0-5）
    pub max_depth: u32,
    /// 最大页面数（1-1000）
    pub max_pages: u32,
    /// 路径包含模式
    pub include_patterns: Vec<String>,
    /// 路径排除模式
    pub exclude_patterns: Vec<String>,
    /// 是否遵循robots.txt
    pub respect_robots: bool,
    /// 渲染策略
    pub render_policy: RenderPolicy,
    /// 单页期限
    pub timeout: Duration,
    /// 爬取并发（同时兼作该主机的治理器容量覆盖）
    pub concurrency: usize,
    /// 强制刷新已缓存页面
    pub force: bool,
}

/// 爬取中发现的一个页面
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPage {
    /// 规范URL
    pub url: String,
    /// 爬取深度
    pub depth: u32,
    /// 页面行ID
    pub page_id: Uuid,
    /// 标题
    pub title: Option<String>,
}

/// 爬取报告
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// 按完成顺序排列的页面
    pub pages: Vec<DiscoveredPage>,
    /// 是否因协作取消而提前结束
    pub cancelled: bool,
}

/// 站点爬取服务
///
/// 从种子开始的BFS：visited按url_hash去重，frontier存(url, depth)，
/// 始终停留在种子的可注册域内。单页失败记事件并继续，只有种子
/// 抓取失败或引擎级故障才使作业失败
pub struct CrawlService {
    /// 抓取协调器
    scraper: Arc<ScrapePageUseCase>,
    /// 作业仓库（进度与关联写入）
    job_repository: Arc<dyn JobRepository>,
    /// 事件仓库
    event_repository: Arc<dyn EventRepository>,
}

impl CrawlService {
    /// 创建新的爬取服务
    pub fn new(
        scraper: Arc<ScrapePageUseCase>,
        job_repository: Arc<dyn JobRepository>,
        event_repository: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            scraper,
            job_repository,
            event_repository,
        }
    }

    /// 执行BFS爬取
    ///
    /// # 参数
    ///
    /// * `job_id` - 所属作业
    /// * `api_key_id` - 作业归属密钥（事件关联）
    /// * `cfg` - 爬取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlReport)` - 发现的页面与取消标记
    /// * `Err(PipelineError)` - 种子失败或引擎级故障
    #[instrument(skip(self, cfg), fields(job_id = %job_id, seed = %cfg.seed_url))]
    pub async fn crawl(
        &self,
        job_id: Uuid,
        api_key_id: Uuid,
        cfg: CrawlConfig,
    ) -> Result<CrawlReport, PipelineError> {
        let include = compile_patterns(&cfg.include_patterns)?;
        let exclude = compile_patterns(&cfg.exclude_patterns)?;

        let (seed, seed_hash) = url_utils::normalize_and_validate(&cfg.seed_url, None).await?;
        let seed_domain = registrable_domain(&seed).ok_or_else(|| {
            PipelineError::new(ErrorCode::InvalidUrl, "Seed URL has no usable host")
        })?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(Url, u32)> = VecDeque::new();
        let mut pages: Vec<DiscoveredPage> = Vec::new();
        let mut scheduled: u32 = 0;
        let mut in_flight = FuturesUnordered::new();

        visited.insert(seed_hash);
        frontier.push_back((seed, 0));

        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            // 填充在途任务直到并发上限或页面预算耗尽
            while in_flight.len() < cfg.concurrency && scheduled < cfg.max_pages {
                let Some((url, depth)) = frontier.pop_front() else {
                    break;
                };
                scheduled += 1;

                let scraper = self.scraper.clone();
                let options = ScrapeOptions {
                    url: url.to_string(),
                    render_policy: cfg.render_policy,
                    respect_robots: cfg.respect_robots,
                    timeout: cfg.timeout,
                    cache_ttl: Some(Duration::from_secs(3600)),
                    force_refresh: cfg.force,
                    host_permits_override: Some(cfg.concurrency),
                    keep_raw_html: false,
                };
                in_flight.push(tokio::spawn(async move {
                    let result = scraper.execute(options).await;
                    (url, depth, result)
                }));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = in_flight.next() => {
                    let (url, depth, result) = joined.map_err(|e| {
                        PipelineError::new(ErrorCode::InternalError, format!("crawl task: {}", e))
                    })?;

                    match result {
                        Ok(outcome) => {
                            self.job_repository
                                .link_page(job_id, outcome.page.id, depth as i32)
                                .await
                                .ok();
                            pages.push(DiscoveredPage {
                                url: outcome.page.url.clone(),
                                depth,
                                page_id: outcome.page.id,
                                title: outcome.page.title.clone(),
                            });

                            if depth < cfg.max_depth {
                                self.enqueue_internal_links(
                                    &outcome.page.links_internal,
                                    &seed_domain,
                                    depth + 1,
                                    &include,
                                    &exclude,
                                    &mut visited,
                                    &mut frontier,
                                );
                            }
                        }
                        Err(error) => {
                            // 种子都拿不到的爬取没有继续的意义
                            if depth == 0 && pages.is_empty() {
                                return Err(error);
                            }
                            warn!("crawl page failed for {}: {}", url, error);
                            let event = Event::new(
                                "crawl.page_failed",
                                EventLevel::Warn,
                                error.message.clone(),
                            )
                            .with_job(job_id)
                            .with_api_key(api_key_id)
                            .with_metadata(serde_json::json!({
                                "url": url.to_string(),
                                "depth": depth,
                                "code": error.code.as_str(),
                            }));
                            if let Err(e) = self.event_repository.append(&event).await {
                                warn!("failed to append crawl event: {}", e);
                            }
                        }
                    }

                    self.job_repository
                        .update_progress(job_id, scheduled as i32, None)
                        .await
                        .ok();

                    if self
                        .job_repository
                        .is_cancel_requested(job_id)
                        .await
                        .unwrap_or(false)
                    {
                        info!("crawl job {} observed cancel request", job_id);
                        return Ok(CrawlReport { pages, cancelled: true });
                    }
                }
                _ = ticker.tick() => {
                    // 在途抓取较慢时也保持心跳与进度新鲜
                    self.job_repository
                        .update_progress(job_id, scheduled as i32, None)
                        .await
                        .ok();
                }
            }
        }

        self.job_repository
            .update_progress(job_id, scheduled as i32, Some(pages.len() as i32))
            .await
            .ok();

        info!(
            "crawl job {} finished with {} pages ({} scheduled)",
            job_id,
            pages.len(),
            scheduled
        );
        Ok(CrawlReport {
            pages,
            cancelled: false,
        })
    }

    /// 过滤并入队同可注册域的内链
    #[allow(clippy::too_many_arguments)]
    fn enqueue_internal_links(
        &self,
        links: &[String],
        seed_domain: &str,
        next_depth: u32,
        include: &[Regex],
        exclude: &[Regex],
        visited: &mut HashSet<String>,
        frontier: &mut VecDeque<(Url, u32)>,
    ) {
        for link in links {
            let Ok(url) = url_utils::normalize_url(link, None) else {
                continue;
            };
            // 外链永不跟随；最终URL重定向出域的页面其内链同样出局
            match registrable_domain(&url) {
                Some(domain) if domain == seed_domain => {}
                _ => continue,
            }
            if !path_allowed(url.path(), include, exclude) {
                continue;
            }
            let hash = url_utils::compute_url_hash(url.as_str());
            if visited.insert(hash) {
                frontier.push_back((url, next_depth));
            }
        }
    }
}

fn registrable_domain(url: &Url) -> Option<String> {
    url.host_str()
        .and_then(psl::domain_str)
        .map(str::to_string)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, PipelineError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                PipelineError::new(
                    ErrorCode::ValidationError,
                    format!("Invalid pattern '{}': {}", p, e),
                )
            })
        })
        .collect()
}

/// 路径过滤：有包含模式时必须命中其一，且不得命中任何排除模式
fn path_allowed(path: &str, include: &[Regex], exclude: &[Regex]) -> bool {
    if !include.is_empty() && !include.iter().any(|p| p.is_match(path)) {
        return false;
    }
    !exclude.iter().any(|p| p.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_allowed() {
        let include = vec![Regex::new("^/docs").unwrap()];
        let exclude = vec![Regex::new("/archive/").unwrap()];

        assert!(path_allowed("/docs/intro", &include, &exclude));
        assert!(!path_allowed("/blog/post", &include, &exclude));
        assert!(!path_allowed("/docs/archive/old", &include, &exclude));
        // 无包含模式时默认放行
        assert!(path_allowed("/anything", &[], &exclude));
    }

    #[test]
    fn test_compile_patterns_rejects_invalid() {
        let err = compile_patterns(&["[".to_string()]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_registrable_domain() {
        let url = Url::parse("https://docs.example.co.uk/a").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("example.co.uk"));
        let url = Url::parse("https://blog.example.com/").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("example.com"));
    }
}
