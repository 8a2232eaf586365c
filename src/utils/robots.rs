// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::single_flight::SingleFlight;
use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use async_trait::async_trait;

/// robots.txt抓取超时
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// 正向缓存TTL（成功取得策略）
const POSITIVE_TTL: Duration = Duration::from_secs(3600);

/// 负向缓存TTL（不可达或非200按放行缓存，避免反复打失败主机）
const NEGATIVE_TTL: Duration = Duration::from_secs(900);

/// Robots.txt检查器接口
#[async_trait]
pub trait RobotsCheckerTrait: Send + Sync {
    /// 检查URL是否被允许访问
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool;
}

/// 缓存的Robots.txt内容
#[derive(Clone)]
struct CachedRobots {
    /// 内容（空串代表"全部放行"）
    content: String,

    /// 过期时间
    expires_at: Instant,
}

/// Robots.txt检查器
///
/// 每主机抓取并缓存robots.txt策略；同一主机的并发查询合并为
/// 一次上游抓取；解析失败时放行
#[derive(Clone)]
pub struct RobotsChecker {
    /// HTTP客户端
    client: reqwest::Client,

    /// 每主机缓存
    cache: Arc<DashMap<String, CachedRobots>>,

    /// 每主机单飞抓取
    flight: Arc<SingleFlight<(String, bool)>>,
}

#[async_trait]
impl RobotsCheckerTrait for RobotsChecker {
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let content = self.robots_content(url).await;
        if content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&content, user_agent, url.as_str())
    }
}

impl Default for RobotsChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsChecker {
    /// 创建新的Robots检查器实例
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: Arc::new(DashMap::new()),
            flight: Arc::new(SingleFlight::new()),
        }
    }

    /// 获取主机的robots.txt内容（带缓存与单飞）
    async fn robots_content(&self, url: &Url) -> String {
        let robots_url = match Self::robots_url(url) {
            Some(u) => u,
            None => return String::new(),
        };

        if let Some(cached) = self.cache.get(&robots_url) {
            if cached.expires_at > Instant::now() {
                return cached.content.clone();
            }
        }
        self.cache.remove(&robots_url);

        let client = self.client.clone();
        let fetch_url = robots_url.clone();
        let ((content, negative), _leader) = self
            .flight
            .run(&robots_url, move || async move {
                Self::fetch_robots(client, &fetch_url).await
            })
            .await;

        let ttl = if negative { NEGATIVE_TTL } else { POSITIVE_TTL };
        self.cache.insert(
            robots_url,
            CachedRobots {
                content: content.clone(),
                expires_at: Instant::now() + ttl,
            },
        );

        content
    }

    fn robots_url(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Some(format!("{}://{}/robots.txt", url.scheme(), authority))
    }

    /// 抓取robots.txt，返回内容与是否为负向结果
    async fn fetch_robots(client: reqwest::Client, robots_url: &str) -> (String, bool) {
        let response = client
            .get(robots_url)
            .header("User-Agent", "extractrs-bot/0.1")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let content = resp.text().await.unwrap_or_default();
                (content, false)
            }
            Ok(resp) => {
                // 404等非200：视为没有策略，短期放行缓存
                tracing::debug!(
                    "robots.txt fetch for {} returned {}, allowing all",
                    robots_url,
                    resp.status()
                );
                (String::new(), true)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch robots.txt from {}: {}", robots_url, e);
                (String::new(), true)
            }
        }
    }

    /// 直接对给定策略内容做判定（测试用）
    pub fn allowed_by_content(content: &str, user_agent: &str, url: &Url) -> bool {
        if content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(content, user_agent, url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disallow_all_blocks() {
        let content = "User-agent: *\nDisallow: /\n";
        let url = Url::parse("https://example.com/private/page").unwrap();
        assert!(!RobotsChecker::allowed_by_content(content, "extractrs-bot", &url));
    }

    #[test]
    fn test_path_scoped_disallow() {
        let content = "User-agent: *\nDisallow: /admin\n";
        let blocked = Url::parse("https://example.com/admin/users").unwrap();
        let allowed = Url::parse("https://example.com/blog/post").unwrap();
        assert!(!RobotsChecker::allowed_by_content(content, "extractrs-bot", &blocked));
        assert!(RobotsChecker::allowed_by_content(content, "extractrs-bot", &allowed));
    }

    #[test]
    fn test_empty_content_allows() {
        let url = Url::parse("https://example.com/anything").unwrap();
        assert!(RobotsChecker::allowed_by_content("", "extractrs-bot", &url));
    }

    #[test]
    fn test_robots_url_keeps_explicit_port() {
        let url = Url::parse("http://example.com:8080/a/b").unwrap();
        assert_eq!(
            RobotsChecker::robots_url(&url).unwrap(),
            "http://example.com:8080/robots.txt"
        );
        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(
            RobotsChecker::robots_url(&url).unwrap(),
            "https://example.com/robots.txt"
        );
    }
}
