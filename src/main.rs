// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use extractrs::application::usecases::scrape_page::ScrapePageUseCase;
use extractrs::config::settings::Settings;
use extractrs::domain::repositories::event_repository::EventRepository;
use extractrs::domain::repositories::job_repository::JobRepository;
use extractrs::domain::services::crawl_service::CrawlService;
use extractrs::domain::services::llm_service::{LlmExtractionService, OpenAiCompatClient};
use extractrs::domain::services::search_service::SearchProvider;
use extractrs::engines::router::AdaptiveFetcher;
use extractrs::infrastructure::cache::page_cache::PageCache;
use extractrs::infrastructure::database::connection;
use extractrs::infrastructure::repositories::api_key_repo_impl::ApiKeyRepositoryImpl;
use extractrs::infrastructure::repositories::event_repo_impl::EventRepositoryImpl;
use extractrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use extractrs::infrastructure::repositories::page_repo_impl::PageRepositoryImpl;
use extractrs::infrastructure::search::serper::SerperProvider;
use extractrs::presentation::middleware::rate_limit_middleware::RateLimiter;
use extractrs::presentation::routes::{self, AppContext};
use extractrs::queue::job_queue::{JobQueue, PostgresJobQueue};
use extractrs::utils::host_governor::HostGovernor;
use extractrs::utils::robots::RobotsChecker;
use extractrs::utils::telemetry;
use extractrs::workers::job_worker::JobWorker;
use extractrs::workers::manager::WorkerManager;
use extractrs::workers::reaper_worker::ReaperWorker;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志与指标
    telemetry::init_telemetry();
    info!("Starting extractrs...");

    // 2. 加载应用程序配置
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    extractrs::infrastructure::metrics::init_metrics(settings.server.metrics_port);

    // 3. 建立数据库连接（schema由部署环境预先迁移）
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    // 4. 仓库
    let job_repository = Arc::new(JobRepositoryImpl::new(db.clone()));
    let page_repository = Arc::new(PageRepositoryImpl::new(db.clone()));
    let api_key_repository = Arc::new(ApiKeyRepositoryImpl::new(db.clone()));
    let event_repository = Arc::new(EventRepositoryImpl::new(db.clone()));

    // 5. 进程级核心组件：缓存、robots、每主机治理、抓取器与协调器
    let cache = Arc::new(PageCache::new(
        page_repository.clone(),
        settings.cache.memory_capacity,
    ));
    let robots = Arc::new(RobotsChecker::new());
    let governor = Arc::new(HostGovernor::new(settings.concurrency.per_host_limit));
    let fetcher = Arc::new(AdaptiveFetcher::new());
    let scraper = Arc::new(ScrapePageUseCase::new(
        cache,
        robots,
        governor,
        fetcher,
    ));

    // 6. 作业队列、爬虫、LLM与搜索
    let queue = Arc::new(PostgresJobQueue::new(
        job_repository.clone(),
        settings.concurrency.queue_watermark,
    ));
    let crawler = Arc::new(CrawlService::new(
        scraper.clone(),
        job_repository.clone() as Arc<dyn JobRepository>,
        event_repository.clone() as Arc<dyn EventRepository>,
    ));
    let llm = Arc::new(LlmExtractionService::new(Arc::new(
        OpenAiCompatClient::new(),
    )));
    let search_provider: Arc<dyn SearchProvider> =
        Arc::new(SerperProvider::new(settings.search.serper_api_key.clone()));
    let rate_limiter = Arc::new(RateLimiter::new());

    // 7. 启动后台工作器（作业池 + 租约回收）
    let mut worker_manager = WorkerManager::new();
    for _ in 0..settings.concurrency.workers {
        worker_manager.register(Arc::new(JobWorker::new(
            queue.clone() as Arc<dyn JobQueue>,
            job_repository.clone() as Arc<dyn JobRepository>,
            event_repository.clone() as Arc<dyn EventRepository>,
            crawler.clone(),
            scraper.clone(),
            llm.clone(),
        )));
    }
    worker_manager.register(Arc::new(ReaperWorker::new(
        job_repository.clone() as Arc<dyn JobRepository>,
        settings.concurrency.job_lease_seconds,
    )));
    worker_manager.start();
    info!(
        "Started {} job worker(s) and the lease reaper",
        settings.concurrency.workers
    );

    // 8. HTTP路由与服务器
    let ctx = AppContext {
        settings: settings.clone(),
        scraper,
        queue,
        api_key_repository,
        search_provider,
        rate_limiter,
    };
    let app = routes::build_router(ctx);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 9. 排空后台工作
    worker_manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
