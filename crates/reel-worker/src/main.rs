//! Clip pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::{DrawTextRenderer, ReframeConfig, Watermark};
use reel_ml_client::{BlockingFaceDetector, DetectorClient};
use reel_queue::{JobQueue, RedisLedger};
use reel_storage::ObjectStore;
use reel_worker::metrics::init_metrics;
use reel_worker::{
    ClaudeOracle, DeepgramTranscriber, DownloadManager, HttpStatusSink, JobExecutor,
    LogStatusSink, ProcessingContext, ProxyPool, ReelRenderer, RetryPolicy, S3ArtifactStore,
    SegmentExtractor, StatusSink, WorkerConfig, WorkerResult, YtDlpBackend,
};

fn build_context(config: &WorkerConfig, queue: &JobQueue) -> WorkerResult<ProcessingContext> {
    let objects = Arc::new(ObjectStore::from_env()?);

    let proxies = match &config.proxy_list {
        Some(raw) => ProxyPool::from_json(raw)?,
        None => ProxyPool::empty(),
    };
    if proxies.is_empty() {
        warn!("No proxies configured, downloading directly");
    } else {
        info!("Loaded {} proxies", proxies.len());
    }
    let downloads = DownloadManager::new(
        Arc::new(YtDlpBackend::new()),
        Arc::new(proxies),
        RetryPolicy::new("download", config.download_max_attempts, config.download_retry_delay),
    )
    .with_object_store(Arc::clone(&objects));

    let oracle = ClaudeOracle::from_env()?;
    let extractor = SegmentExtractor::new(
        Arc::new(oracle),
        RetryPolicy::new("segment_oracle", config.oracle_max_attempts, config.oracle_retry_delay),
    );

    let detector_client = Arc::new(DetectorClient::from_env()?);
    let detector = BlockingFaceDetector::new(detector_client, tokio::runtime::Handle::current());
    let watermark = config
        .watermark_path
        .as_ref()
        .map(Watermark::load)
        .transpose()?;
    let renderer = ReelRenderer::new(
        Arc::new(detector),
        ReframeConfig::default(),
        watermark,
        Arc::new(DrawTextRenderer::new()),
    );

    let status: Arc<dyn StatusSink> = match &config.status_sink_url {
        Some(url) => Arc::new(HttpStatusSink::new(url)?),
        None => {
            warn!("No status sink configured, status updates are only logged");
            Arc::new(LogStatusSink)
        }
    };

    Ok(ProcessingContext {
        acquirer: Arc::new(downloads),
        transcriber: Arc::new(DeepgramTranscriber::from_env()?),
        extractor: Arc::new(extractor),
        renderer: Arc::new(renderer),
        artifacts: Arc::new(S3ArtifactStore::new(objects, config.presign_ttl)),
        status,
        ledger: Arc::new(RedisLedger::new(queue.client().clone())),
        work_dir: config.work_dir.clone(),
    })
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting reel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let context = match build_context(&config, &queue) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to initialize pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(config, Arc::new(queue), Arc::new(context)));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
