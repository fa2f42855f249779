//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reel_queue::{ClipJob, JobQueue};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::{process_job, ProcessingContext};

/// Delivered messages as `(message_id, job)`.
pub type Deliveries = Vec<(String, ClipJob)>;

/// Where the executor gets its jobs from.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn init(&self) -> WorkerResult<()>;

    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> WorkerResult<Deliveries>;

    /// Jobs whose lease expired on another consumer.
    async fn claim_expired(&self, consumer: &str, count: usize) -> WorkerResult<Deliveries>;

    async fn ack(&self, message_id: &str) -> WorkerResult<()>;

    /// Dead-letter a failed job and drop it from the live queue.
    async fn fail(&self, message_id: &str, job: &ClipJob, error: &str) -> WorkerResult<()>;
}

#[async_trait]
impl JobSource for JobQueue {
    async fn init(&self) -> WorkerResult<()> {
        Ok(JobQueue::init(self).await?)
    }

    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> WorkerResult<Deliveries> {
        Ok(JobQueue::consume(self, consumer, block_ms, count).await?)
    }

    async fn claim_expired(&self, consumer: &str, count: usize) -> WorkerResult<Deliveries> {
        Ok(JobQueue::claim_expired(self, consumer, count).await?)
    }

    async fn ack(&self, message_id: &str) -> WorkerResult<()> {
        Ok(JobQueue::ack(self, message_id).await?)
    }

    async fn fail(&self, message_id: &str, job: &ClipJob, error: &str) -> WorkerResult<()> {
        Ok(self.dlq(message_id, job, error).await?)
    }
}

/// Runs one job to completion.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ClipJob) -> WorkerResult<()>;
}

#[async_trait]
impl JobHandler for ProcessingContext {
    async fn handle(&self, job: &ClipJob) -> WorkerResult<()> {
        process_job(self, job).await.map(|_| ())
    }
}

/// Job executor that processes jobs from the queue on a fixed-size pool.
pub struct JobExecutor {
    config: WorkerConfig,
    source: Arc<dyn JobSource>,
    handler: Arc<dyn JobHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, source: Arc<dyn JobSource>, handler: Arc<dyn JobHandler>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.pool_size));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            source,
            handler,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume jobs until [`shutdown`](Self::shutdown), then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with a pool of {}",
            self.consumer_name, self.config.pool_size
        );

        self.source.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claimer();

        // A read is never cancelled: messages it returns are always dispatched,
        // so shutdown is only observed between reads.
        while !*shutdown_rx.borrow() {
            if let Err(e) = self.consume_jobs().await {
                error!("Error consuming jobs: {}", e);
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
        }
        info!("Shutdown signal received, stopping executor");

        if let Err(e) = claim_task.await {
            warn!("Claim task ended abnormally: {}", e);
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout after {:?}, abandoning in-flight jobs to lease expiry",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over jobs of crashed workers.
    fn spawn_claimer(&self) -> tokio::task::JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let handler = Arc::clone(&self.handler);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let pool_size = self.config.pool_size;
        let period = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            while !*shutdown_rx.borrow() {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        match source.claim_expired(&consumer_name, available).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} expired jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                                        Ok(permit) => permit,
                                        Err(_) => break,
                                    };
                                    let source = Arc::clone(&source);
                                    let handler = Arc::clone(&handler);
                                    let semaphore = Arc::clone(&semaphore);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        metrics::set_jobs_in_flight(pool_size - semaphore.available_permits());
                                        Self::execute_job(source, handler, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim expired jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .source
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::queue_failed("job semaphore closed"))?;
            let source = Arc::clone(&self.source);
            let handler = Arc::clone(&self.handler);
            metrics::set_jobs_in_flight(self.config.pool_size - self.job_semaphore.available_permits());

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(source, handler, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Run one job. Success acks; failure dead-letters. Jobs are never retried
    /// here since the failed status has already been published.
    async fn execute_job(
        source: Arc<dyn JobSource>,
        handler: Arc<dyn JobHandler>,
        message_id: String,
        job: ClipJob,
    ) {
        let job_id = job.job_id.to_string();
        info!("Executing job {}", job_id);

        match handler.handle(&job).await {
            Ok(()) => {
                info!("Job {} completed successfully", job_id);
                if let Err(e) = source.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                if let Err(dlq_err) = source.fail(&message_id, &job, &e.to_string()).await {
                    error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.pool_size {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySource {
        pending: Mutex<VecDeque<(String, ClipJob)>>,
        acked: Mutex<Vec<String>>,
        failed: Mutex<Vec<(String, String)>>,
        /// Time between taking messages off the stream and returning them.
        read_delay: Duration,
    }

    impl MemorySource {
        fn with_jobs(projects: &[&str]) -> Self {
            let source = Self::default();
            {
                let mut pending = source.pending.lock().unwrap();
                for (i, project) in projects.iter().enumerate() {
                    pending.push_back((format!("{}-0", i), ClipJob::new("u1", *project, "https://v")));
                }
            }
            source
        }

        fn settled(&self) -> usize {
            self.acked.lock().unwrap().len() + self.failed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobSource for MemorySource {
        async fn init(&self) -> WorkerResult<()> {
            Ok(())
        }

        async fn consume(&self, _consumer: &str, _block_ms: u64, count: usize) -> WorkerResult<Deliveries> {
            let batch: Deliveries = {
                let mut pending = self.pending.lock().unwrap();
                let n = count.min(pending.len());
                pending.drain(..n).collect()
            };
            if batch.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            } else {
                tokio::time::sleep(self.read_delay).await;
            }
            Ok(batch)
        }

        async fn claim_expired(&self, _consumer: &str, _count: usize) -> WorkerResult<Deliveries> {
            Ok(Vec::new())
        }

        async fn ack(&self, message_id: &str) -> WorkerResult<()> {
            self.acked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn fail(&self, message_id: &str, _job: &ClipJob, error: &str) -> WorkerResult<()> {
            self.failed
                .lock()
                .unwrap()
                .push((message_id.to_string(), error.to_string()));
            Ok(())
        }
    }

    /// Fails projects named `bad`, tracks peak concurrency.
    #[derive(Default)]
    struct CountingHandler {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, job: &ClipJob) -> WorkerResult<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if job.project_id == "bad" {
                Err(WorkerError::render("codec exploded"))
            } else {
                Ok(())
            }
        }
    }

    fn config(pool_size: usize) -> WorkerConfig {
        WorkerConfig {
            pool_size,
            shutdown_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        }
    }

    async fn wait_until_settled(source: &MemorySource, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while source.settled() < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not settle");
    }

    #[tokio::test]
    async fn test_success_acks_and_failure_dead_letters() {
        let source = Arc::new(MemorySource::with_jobs(&["p1", "bad", "p3"]));
        let handler = Arc::new(CountingHandler::default());
        let executor = Arc::new(JobExecutor::new(config(2), source.clone(), handler));

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        wait_until_settled(&source, 3).await;
        executor.shutdown();
        runner.await.unwrap().unwrap();

        let mut acked = source.acked.lock().unwrap().clone();
        acked.sort();
        assert_eq!(acked, vec!["0-0".to_string(), "2-0".to_string()]);

        let failed = source.failed.lock().unwrap().clone();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "1-0");
        assert!(failed[0].1.contains("codec exploded"));
    }

    #[tokio::test]
    async fn test_pool_size_bounds_concurrency() {
        let projects = ["a", "b", "c", "d", "e", "f", "g"];
        let source = Arc::new(MemorySource::with_jobs(&projects));
        let handler = Arc::new(CountingHandler::default());
        let executor = Arc::new(JobExecutor::new(config(2), source.clone(), handler.clone()));

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        wait_until_settled(&source, projects.len()).await;
        executor.shutdown();
        runner.await.unwrap().unwrap();

        assert_eq!(source.acked.lock().unwrap().len(), projects.len());
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
        assert!(handler.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_read_still_runs_delivered_jobs() {
        let source = Arc::new(MemorySource {
            read_delay: Duration::from_millis(200),
            ..MemorySource::with_jobs(&["p1"])
        });
        let handler = Arc::new(CountingHandler::default());
        let executor = Arc::new(JobExecutor::new(config(2), source.clone(), handler));

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        // the message has left the stream but the read has not returned yet
        tokio::time::timeout(Duration::from_secs(5), async {
            while !source.pending.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        executor.shutdown();
        runner.await.unwrap().unwrap();

        assert_eq!(source.acked.lock().unwrap().clone(), vec!["0-0".to_string()]);
    }

    #[test]
    fn test_consumer_names_are_unique() {
        let source: Arc<dyn JobSource> = Arc::new(MemorySource::default());
        let handler: Arc<dyn JobHandler> = Arc::new(CountingHandler::default());
        let a = JobExecutor::new(config(1), Arc::clone(&source), Arc::clone(&handler));
        let b = JobExecutor::new(config(1), source, handler);
        assert!(a.consumer_name().starts_with("worker-"));
        assert_ne!(a.consumer_name(), b.consumer_name());
    }
}
