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

use crate::application::dto::agent_request::AgentExtractRequestDto;
use crate::application::dto::map_request::MapRequestDto;
use crate::application::usecases::scrape_page::{ScrapeOptions, ScrapePageUseCase};
use crate::domain::models::event::{Event, EventLevel};
use crate::domain::models::job::{Job, JobType};
use crate::domain::repositories::event_repository::EventRepository;
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::services::crawl_service::{CrawlConfig, CrawlService};
use crate::domain::services::llm_service::LlmExtractionService;
use crate::queue::job_queue::JobQueue;
use crate::utils::errors::{ErrorCode, PipelineError, WorkerError};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 队列为空时的轮询间隔
const IDLE_POLL: Duration = Duration::from_secs(1);

/// 作业默认期限（毫秒）
const DEFAULT_JOB_TIMEOUT_MS: u64 = 30_000;

/// 作业工作器
///
/// 从持久化队列原子认领作业并按类型分发到爬取或LLM提取；
/// 进度与心跳随工作单元写回，协作取消在工作单元之间观察
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    job_repository: Arc<dyn JobRepository>,
    event_repository: Arc<dyn EventRepository>,
    crawler: Arc<CrawlService>,
    scraper: Arc<ScrapePageUseCase>,
    llm: Arc<LlmExtractionService>,
    worker_id: Uuid,
}

impl JobWorker {
    /// 创建新的作业工作器实例
    pub fn new(
        queue: Arc<dyn JobQueue>,
        job_repository: Arc<dyn JobRepository>,
        event_repository: Arc<dyn EventRepository>,
        crawler: Arc<CrawlService>,
        scraper: Arc<ScrapePageUseCase>,
        llm: Arc<LlmExtractionService>,
    ) -> Self {
        Self {
            queue,
            job_repository,
            event_repository,
            crawler,
            scraper,
            llm,
            worker_id: Uuid::new_v4(),
        }
    }

    async fn process_next(&self) -> Result<bool, WorkerError> {
        let claimed = self
            .queue
            .claim()
            .await
            .map_err(|e| WorkerError::QueueError(e.to_string()))?;

        let Some(job) = claimed else {
            return Ok(false);
        };

        self.process_job(job).await;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    async fn process_job(&self, job: Job) {
        info!("Processing job");
        metrics::counter!("extractrs_jobs_claimed_total").increment(1);

        let outcome = match job.job_type {
            JobType::Map => self.process_map_job(&job).await,
            JobType::AgentExtract => self.process_agent_job(&job).await,
        };

        if let Err(error) = outcome {
            error!("job {} failed: {}", job.id, error);
            let event = Event::new("job.failed", EventLevel::Error, error.message.clone())
                .with_job(job.id)
                .with_api_key(job.api_key_id)
                .with_metadata(json!({"code": error.code.as_str()}));
            if let Err(e) = self.event_repository.append(&event).await {
                warn!("failed to append job event: {}", e);
            }
            if let Err(e) = self
                .job_repository
                .mark_failed(job.id, error.code, &error.message)
                .await
            {
                error!("failed to persist job failure for {}: {}", job.id, e);
            }
        }
    }

    /// 处理站点地图作业
    async fn process_map_job(&self, job: &Job) -> Result<(), PipelineError> {
        let request: MapRequestDto =
            serde_json::from_value(job.input_params.clone()).map_err(|e| {
                PipelineError::new(
                    ErrorCode::ValidationError,
                    format!("Invalid map job parameters: {}", e),
                )
            })?;

        let cfg = CrawlConfig {
            seed_url: request.url.clone(),
            max_depth: request.max_depth,
            max_pages: request.max_pages,
            include_patterns: request.include_patterns.clone(),
            exclude_patterns: request.exclude_patterns.clone(),
            respect_robots: request.respect_robots,
            render_policy: request.use_playwright,
            timeout: Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_JOB_TIMEOUT_MS)),
            concurrency: request.concurrency as usize,
            force: request.force,
        };

        let report = self.crawler.crawl(job.id, job.api_key_id, cfg).await?;

        if report.cancelled {
            let cancelled = job
                .clone()
                .cancel()
                .map_err(|_| already_terminal(job.id))?;
            self.persist(cancelled).await?;
            return Ok(());
        }

        let result = json!({
            "seed_url": request.url,
            "count": report.pages.len(),
            "pages": report.pages,
        });
        let mut completed = job
            .clone()
            .complete(result)
            .map_err(|_| already_terminal(job.id))?;
        completed.pages_discovered = report.pages.len() as i32;
        completed.pages_total = Some(report.pages.len() as i32);
        self.persist(completed).await?;
        Ok(())
    }

    /// 处理LLM结构化提取作业
    async fn process_agent_job(&self, job: &Job) -> Result<(), PipelineError> {
        let request: AgentExtractRequestDto = serde_json::from_value(job.input_params.clone())
            .map_err(|e| {
                PipelineError::new(
                    ErrorCode::ValidationError,
                    format!("Invalid agent job parameters: {}", e),
                )
            })?;

        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(DEFAULT_JOB_TIMEOUT_MS));

        let outcome = self
            .scraper
            .execute(ScrapeOptions {
                url: request.url.clone(),
                render_policy: request.use_playwright,
                respect_robots: request.respect_robots,
                timeout,
                cache_ttl: Some(Duration::from_secs(3600)),
                force_refresh: false,
                host_permits_override: None,
                keep_raw_html: false,
            })
            .await?;

        // 抓取与LLM调用之间是协作取消的检查点
        if self.cancel_requested(job.id).await {
            let cancelled = job
                .clone()
                .cancel()
                .map_err(|_| already_terminal(job.id))?;
            self.persist(cancelled).await?;
            return Ok(());
        }

        let markdown = outcome.page.markdown.clone().unwrap_or_default();
        if markdown.is_empty() {
            return Err(PipelineError::new(
                ErrorCode::FetchError,
                "Page produced no extractable content",
            ));
        }

        let data = self
            .llm
            .extract_structured(
                &markdown,
                &request.prompt,
                request.schema_definition.as_ref(),
                timeout,
            )
            .await?;

        let result = json!({
            "data": data,
            "source_url": outcome.page.canonical_url,
            "markdown_sha256": outcome.page.content_hash,
        });

        let completed = job
            .clone()
            .complete(result)
            .map_err(|_| already_terminal(job.id))?;
        self.persist(completed).await?;
        Ok(())
    }

    async fn cancel_requested(&self, job_id: Uuid) -> bool {
        self.job_repository
            .is_cancel_requested(job_id)
            .await
            .unwrap_or(false)
    }

    async fn persist(&self, job: Job) -> Result<(), PipelineError> {
        self.job_repository
            .update(&job)
            .await
            .map_err(|e| PipelineError::new(ErrorCode::InternalError, e.to_string()))?;
        Ok(())
    }
}

fn already_terminal(job_id: Uuid) -> PipelineError {
    PipelineError::new(
        ErrorCode::InternalError,
        format!("job {} is already terminal", job_id),
    )
}

#[async_trait]
impl Worker for JobWorker {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Job worker {} started", self.worker_id);

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!("Error processing job: {}", e);
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }

        info!("Job worker {} stopped", self.worker_id);
    }

    fn name(&self) -> &str {
        "job-worker"
    }
}
