// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::Renderer;
use crate::engines::traits::{EngineError, FetchResponse};
use crate::utils::url_utils;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use url::Url;

/// 无头渲染的硬性上限
const RENDER_HARD_CAP: Duration = Duration::from_secs(30);

/// 页面进入网络静默前的最长等待
const NETWORK_IDLE_CAP: Duration = Duration::from_secs(10);

/// 网络静默窗口
const QUIET_WINDOW: Duration = Duration::from_millis(500);

// Global browser instance to avoid re-launching Chrome on every request.
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

// Asynchronously gets or initializes the shared browser instance.
// This function ensures that the browser is launched only once.
pub async fn get_browser() -> Result<&'static Browser, EngineError> {
    BROWSER_INSTANCE
        .get_or_try_init(|| async {
            let remote_debugging_url = std::env::var("EXTRACTRS_CHROMIUM_REMOTE_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url.clone()).await.map_err(|e| {
                    EngineError::RenderFailed(format!("Failed to connect to remote Chrome: {}", e))
                })?
            } else {
                let mut builder = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(RENDER_HARD_CAP);

                builder = builder.arg("--disable-gpu").arg("--disable-dev-shm-usage");

                Browser::launch(builder.build().map_err(EngineError::RenderFailed)?)
                    .await
                    .map_err(|e| EngineError::RenderFailed(e.to_string()))?
            };

            // Spawn a handler to process browser events
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 无头渲染引擎
///
/// 基于chromiumoxide的浏览器渲染：加载页面，等待网络静默
/// （500ms无在途请求）或10秒孰先，捕获DOM HTML，整体受30秒
/// 硬性上限约束。SSRF与重定向纪律与静态抓取一致
pub struct BrowserEngine;

impl BrowserEngine {
    /// 执行无头渲染抓取
    ///
    /// # 参数
    ///
    /// * `url` - 规范化且已通过SSRF校验的URL
    /// * `timeout` - 调用方期限（与30秒硬上限取较小值）
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 渲染结果（renderer=headless）
    /// * `Err(EngineError)` - 渲染失败或超时
    pub async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, EngineError> {
        let cap = timeout.min(RENDER_HARD_CAP);
        let started = Instant::now();

        let result = tokio::time::timeout(cap, Self::render(url)).await;

        match result {
            Ok(Ok((final_url, body))) => {
                // 渲染器可能被页面脚本重定向，最终落点同样要过SSRF校验
                url_utils::validate_ssrf(&final_url)
                    .await
                    .map_err(EngineError::Blocked)?;

                let mut headers = HashMap::new();
                headers.insert("content-type".to_string(), "text/html".to_string());

                Ok(FetchResponse {
                    status: 200,
                    final_url,
                    headers,
                    body,
                    renderer: Renderer::Headless,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    async fn render(url: &Url) -> Result<(Url, String), EngineError> {
        let browser = get_browser().await?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::RenderFailed(e.to_string()))?;

        let navigation = async {
            page.goto(url.as_str())
                .await
                .map_err(|e| EngineError::RenderFailed(e.to_string()))?;
            let _ = page.wait_for_navigation().await;
            Self::wait_for_quiet(&page).await;

            let final_url = page
                .url()
                .await
                .map_err(|e| EngineError::RenderFailed(e.to_string()))?
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());

            let body = page
                .content()
                .await
                .map_err(|e| EngineError::RenderFailed(e.to_string()))?;

            Ok((final_url, body))
        };

        let result = navigation.await;
        let _ = page.close().await;
        result
    }

    /// 等待文档就绪并静默一个窗口，上限10秒
    async fn wait_for_quiet(page: &chromiumoxide::Page) {
        let deadline = Instant::now() + NETWORK_IDLE_CAP;
        loop {
            let ready = page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<String>().ok())
                .map(|state| state == "complete")
                .unwrap_or(false);

            if ready {
                tokio::time::sleep(QUIET_WINDOW).await;
                return;
            }
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
