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

use crate::domain::models::page::Renderer;
use crate::engines::traits::{EngineError, FetchResponse};
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

/// 重定向跳数上限
const MAX_REDIRECTS: usize = 5;

/// 静态抓取引擎
///
/// 基于reqwest的HTTP抓取：自动重定向被关闭，由引擎手动逐跳
/// 跟随并对每一跳重新执行SSRF校验；连接错误、5xx与408/429
/// 按指数退避重试，其余4xx直接呈报调用方
pub struct HttpEngine {
    /// HTTP客户端
    client: reqwest::Client,
    /// 重试策略
    retry_policy: RetryPolicy,
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpEngine {
    /// 创建新的静态抓取引擎
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            )
            .default_headers(headers)
            .redirect(Policy::none())
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self {
            client,
            retry_policy: RetryPolicy::standard(),
        }
    }

    /// 执行一次完整抓取（含重试与重定向跟随）
    ///
    /// # 参数
    ///
    /// * `url` - 规范化且已通过SSRF校验的URL
    /// * `timeout` - 本次抓取的总期限
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 抓取结果（renderer=static）
    /// * `Err(EngineError)` - 超时、网络错误、SSRF拦截或上游4xx
    pub async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, EngineError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let remaining = timeout
                .checked_sub(started.elapsed())
                .ok_or(EngineError::Timeout)?;

            match self.fetch_once(url, remaining).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !Self::is_retryable(&err) || !self.retry_policy.should_retry(attempt) {
                        return Err(err);
                    }
                    let backoff = self.retry_policy.calculate_backoff(attempt);
                    if started.elapsed() + backoff >= timeout {
                        return Err(err);
                    }
                    tracing::debug!(
                        "retrying fetch of {} after attempt {} ({})",
                        url,
                        attempt,
                        err
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// 单次尝试：手动逐跳跟随重定向
    async fn fetch_once(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, EngineError> {
        let started = Instant::now();
        let mut current = url.clone();

        for hop in 0..=MAX_REDIRECTS {
            // 每一跳都重新校验，落到封禁地址的重定向按SSRF_BLOCKED失败
            if hop > 0 {
                url_utils::validate_ssrf(&current)
                    .await
                    .map_err(EngineError::Blocked)?;
            }

            let remaining = timeout
                .checked_sub(started.elapsed())
                .ok_or(EngineError::Timeout)?;

            let response = self
                .client
                .get(current.clone())
                .timeout(remaining)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EngineError::Timeout
                    } else {
                        EngineError::RequestFailed(e.to_string())
                    }
                })?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        EngineError::RequestFailed("Redirect without Location header".to_string())
                    })?;
                current = current.join(location).map_err(|e| {
                    EngineError::RequestFailed(format!("Invalid redirect target: {}", e))
                })?;
                continue;
            }

            if Self::is_retryable_status(status) {
                return Err(EngineError::UpstreamStatus(status.as_u16()));
            }

            if status.is_client_error() {
                return Err(EngineError::UpstreamStatus(status.as_u16()));
            }

            let mut headers = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(v) = value.to_str() {
                    headers.insert(name.as_str().to_string(), v.to_string());
                }
            }

            let body = response
                .text()
                .await
                .map_err(|e| EngineError::RequestFailed(e.to_string()))?;

            return Ok(FetchResponse {
                status: status.as_u16(),
                final_url: current,
                headers,
                body,
                renderer: Renderer::Static,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Err(EngineError::TooManyRedirects)
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
    }

    fn is_retryable(err: &EngineError) -> bool {
        match err {
            EngineError::RequestFailed(_) => true,
            EngineError::UpstreamStatus(status) => {
                StatusCode::from_u16(*status)
                    .map(Self::is_retryable_status)
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}
