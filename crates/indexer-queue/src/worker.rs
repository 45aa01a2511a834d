use crate::backend::{FailureOutcome, JobRecord};
use crate::QueueError;
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use indexer_core::{IndexerError, QueueConfig};
use indexer_redis::{with_lock, Coordinator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runs one decoded job. An `Err` schedules a retry with backoff, or parks the
/// job once its attempts are used up.
#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    async fn handle(&self, job: T) -> indexer_core::Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub lease: Duration,
    pub completed_retention: Duration,
    pub poll_interval: Duration,
    /// How often expired leases are swept back to pending
    pub stalled_check_interval: Duration,
    pub retry: RetryPolicy,
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        let lease = Duration::from_secs(config.lease_secs.max(1));
        Self {
            concurrency: config.concurrency.max(1),
            lease,
            completed_retention: Duration::from_secs(config.completed_retention_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            stalled_check_interval: (lease / 2).max(Duration::from_secs(1)),
            retry: RetryPolicy::from(config),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Executes one reserved job and settles it with the backend
struct JobRunner<T> {
    queue: JobQueue<T>,
    handler: Arc<dyn JobHandler<T>>,
    lease: Duration,
    completed_retention: Duration,
    retry: RetryPolicy,
}

impl<T> JobRunner<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn run(&self, job: JobRecord) {
        let queue = self.queue.name();
        let started = Instant::now();

        let (result, policy) = match JobQueue::<T>::decode(&job.payload) {
            Ok(payload) => (self.handle_leased(&job, payload).await, self.retry),
            // The payload fails to decode the same way on every attempt
            Err(e) => (
                Err(IndexerError::from(e)),
                RetryPolicy::new(1, Duration::ZERO),
            ),
        };

        indexer_metrics::histograms::job_duration(queue, started.elapsed());

        match result {
            Ok(()) => {
                indexer_metrics::counters::jobs_completed(queue);
                match self
                    .queue
                    .backend()
                    .complete(&job, self.completed_retention)
                    .await
                {
                    Ok(()) => {}
                    Err(QueueError::LeaseLost(_)) => {
                        warn!(queue = %queue, job_id = %job.id, "Job finished after its lease was taken over");
                    }
                    Err(e) => {
                        warn!(queue = %queue, job_id = %job.id, error = %e, "Failed to mark job complete");
                    }
                }
            }
            Err(err) => {
                indexer_metrics::counters::jobs_failed(queue);

                match self
                    .queue
                    .backend()
                    .fail(&job, &err.to_string(), &policy)
                    .await
                {
                    Ok(FailureOutcome::Retrying { attempt, delay }) => {
                        warn!(
                            queue = %queue,
                            job_id = %job.id,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            transient = err.is_transient(),
                            error = %err,
                            "Job failed, retrying"
                        );
                    }
                    Ok(FailureOutcome::Parked { attempts }) => {
                        indexer_metrics::counters::jobs_parked(queue);
                        error!(
                            queue = %queue,
                            job_id = %job.id,
                            attempts = attempts,
                            error = %err,
                            "Job parked"
                        );
                    }
                    Err(QueueError::LeaseLost(_)) => {
                        warn!(queue = %queue, job_id = %job.id, error = %err, "Job failed after its lease was taken over");
                    }
                    Err(e) => {
                        error!(queue = %queue, job_id = %job.id, error = %e, "Failed to record job failure");
                    }
                }
            }
        }
    }

    /// Run the handler, renewing the lease every third of its length until it returns
    async fn handle_leased(&self, job: &JobRecord, payload: T) -> indexer_core::Result<()> {
        let period = (self.lease / 3).max(Duration::from_millis(1));
        let mut renew = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handling = self.handler.handle(payload);
        tokio::pin!(handling);

        loop {
            tokio::select! {
                result = &mut handling => return result,
                _ = renew.tick() => {
                    match self.queue.backend().extend_lease(job, self.lease).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(queue = %self.queue.name(), job_id = %job.id, "Job lease lost while running");
                        }
                        Err(e) => {
                            warn!(queue = %self.queue.name(), job_id = %job.id, error = %e, "Failed to renew job lease");
                        }
                    }
                }
            }
        }
    }
}

/// Pulls jobs from one queue and runs up to `concurrency` of them at a time
pub struct QueueWorker<T> {
    runner: Arc<JobRunner<T>>,
    config: WorkerConfig,
    coordinator: Option<Arc<dyn Coordinator>>,
}

impl<T> QueueWorker<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(queue: JobQueue<T>, handler: Arc<dyn JobHandler<T>>, config: WorkerConfig) -> Self {
        let runner = JobRunner {
            queue,
            handler,
            lease: config.lease,
            completed_retention: config.completed_retention,
            retry: config.retry,
        };
        Self {
            runner: Arc::new(runner),
            config,
            coordinator: None,
        }
    }

    /// Serialize stalled-job sweeps across processes behind a lock
    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn queue_name(&self) -> &str {
        self.runner.queue.name()
    }

    /// Run until `shutdown` fires, then wait for in-flight jobs
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let queue = self.queue_name().to_string();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut stalled_tick = tokio::time::interval(self.config.stalled_check_interval);

        info!(queue = %queue, concurrency = self.config.concurrency, "Queue worker started");

        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(queue = %queue, error = %e, "Job task panicked");
                }
            }
            indexer_metrics::gauges::set_worker_in_flight(&queue, tasks.len());

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(queue = %queue, "Queue worker shutting down");
                    break;
                }
                _ = stalled_tick.tick() => {
                    self.sweep_stalled().await;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    match self.runner.queue.backend().reserve(self.config.lease).await {
                        Ok(Some(job)) => {
                            debug!(queue = %queue, job_id = %job.id, attempts = job.attempts, "Job reserved");
                            let runner = Arc::clone(&self.runner);
                            tasks.spawn(async move {
                                runner.run(job).await;
                                drop(permit);
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                        Err(e) => {
                            drop(permit);
                            warn!(queue = %queue, error = %e, "Failed to reserve job");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }

        if !tasks.is_empty() {
            info!(queue = %queue, in_flight = tasks.len(), "Waiting for in-flight jobs");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(queue = %queue, error = %e, "Job task panicked");
            }
        }
        indexer_metrics::gauges::set_worker_in_flight(&queue, 0);
    }

    /// Run every job that is ready right now, one at a time. Returns how many ran.
    pub async fn process_available(&self) -> crate::Result<usize> {
        let mut processed = 0;
        while let Some(job) = self.runner.queue.backend().reserve(self.config.lease).await? {
            self.runner.run(job).await;
            processed += 1;
        }
        Ok(processed)
    }

    async fn sweep_stalled(&self) {
        let queue = self.queue_name();
        let backend = self.runner.queue.backend();
        let recover = backend.recover_stalled();

        let result = match &self.coordinator {
            Some(coordinator) => {
                let lock = format!("{}:stalled-check", queue);
                let ttl = self.config.stalled_check_interval.as_secs().max(1);
                match with_lock(coordinator.as_ref(), &lock, ttl, recover).await {
                    Ok(Some(result)) => result.map_err(IndexerError::from),
                    Ok(None) => Ok(0),
                    Err(e) => Err(e),
                }
            }
            None => recover.await.map_err(IndexerError::from),
        };

        match result {
            Ok(0) => {}
            Ok(recovered) => {
                indexer_metrics::counters::jobs_recovered(queue, recovered as u64);
                warn!(queue = %queue, recovered = recovered, "Recovered stalled jobs");
            }
            Err(e) => warn!(queue = %queue, error = %e, "Stalled job sweep failed"),
        }

        if let Ok(counts) = backend.counts().await {
            indexer_metrics::gauges::set_queue_depth(queue, counts.pending, counts.active, counts.parked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryQueueBackend, QueueBackend, QueueCounts};
    use indexer_redis::MemoryCoordinator;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Work {
        value: u32,
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<u32>>,
        failures_left: AtomicUsize,
        permanent: bool,
    }

    #[async_trait]
    impl JobHandler<Work> for Recording {
        async fn handle(&self, job: Work) -> indexer_core::Result<()> {
            self.seen.lock().unwrap().push(job.value);
            if self.permanent {
                return Err(IndexerError::Decode("bad".into()));
            }
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(IndexerError::Storage("db down".into()));
            }
            Ok(())
        }
    }

    fn worker(handler: Arc<Recording>) -> (QueueWorker<Work>, Arc<MemoryQueueBackend>) {
        let backend = Arc::new(MemoryQueueBackend::new("work"));
        let queue = JobQueue::new(backend.clone() as Arc<dyn QueueBackend>);
        let config = WorkerConfig {
            concurrency: 4,
            lease: Duration::from_secs(30),
            completed_retention: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(10),
            stalled_check_interval: Duration::from_secs(1),
            retry: RetryPolicy::new(3, Duration::from_secs(10)),
        };
        (QueueWorker::new(queue, handler, config), backend)
    }

    #[tokio::test]
    async fn test_duplicate_ids_execute_once() {
        let handler = Arc::new(Recording::default());
        let (worker, _) = worker(handler.clone());
        let queue = worker.runner.queue.clone();

        queue.add("ctx-1", &Work { value: 1 }).await.unwrap();
        queue.add("ctx-1", &Work { value: 1 }).await.unwrap();
        assert_eq!(worker.process_available().await.unwrap(), 1);

        // Completed ids still coalesce
        assert!(!queue.add("ctx-1", &Work { value: 1 }).await.unwrap());
        assert_eq!(worker.process_available().await.unwrap(), 0);
        assert_eq!(*handler.seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_after_backoff() {
        let handler = Arc::new(Recording {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let (worker, backend) = worker(handler.clone());
        worker.runner.queue.add("ctx", &Work { value: 7 }).await.unwrap();

        assert_eq!(worker.process_available().await.unwrap(), 1);
        assert_eq!(worker.process_available().await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(worker.process_available().await.unwrap(), 1);

        assert_eq!(*handler.seen.lock().unwrap(), vec![7, 7]);
        assert_eq!(backend.counts().await.unwrap(), QueueCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_data_backs_off_then_parks_at_max_attempts() {
        let handler = Arc::new(Recording {
            permanent: true,
            ..Default::default()
        });
        let (worker, backend) = worker(handler.clone());
        worker.runner.queue.add("ctx", &Work { value: 1 }).await.unwrap();

        assert_eq!(worker.process_available().await.unwrap(), 1);
        assert!(backend.parked().await.unwrap().is_empty());
        assert_eq!(backend.counts().await.unwrap().pending, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(worker.process_available().await.unwrap(), 1);
        // Second backoff doubles
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(worker.process_available().await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(worker.process_available().await.unwrap(), 1);

        let parked = backend.parked().await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].attempts, 3);
        assert_eq!(handler.seen.lock().unwrap().len(), 3);
    }

    #[derive(Default)]
    struct Slow {
        runs: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler<Work> for Slow {
        async fn handle(&self, _job: Work) -> indexer_core::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(150)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_running_past_its_lease_is_not_reserved_again() {
        let handler = Arc::new(Slow::default());
        let backend = Arc::new(MemoryQueueBackend::new("slow"));
        let queue: JobQueue<Work> = JobQueue::new(backend.clone() as Arc<dyn QueueBackend>);
        let config = WorkerConfig {
            concurrency: 2,
            lease: Duration::from_secs(30),
            completed_retention: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(10),
            stalled_check_interval: Duration::from_secs(1),
            retry: RetryPolicy::new(3, Duration::from_secs(10)),
        };
        let worker = Arc::new(QueueWorker::new(queue.clone(), handler.clone(), config));
        queue.add("ctx-1", &Work { value: 1 }).await.unwrap();

        let first = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.process_available().await }
        });

        // Well past the 30s lease, while the handler is still busy
        tokio::time::sleep(Duration::from_secs(100)).await;
        worker.sweep_stalled().await;
        assert_eq!(backend.counts().await.unwrap().active, 1);
        assert_eq!(worker.process_available().await.unwrap(), 0);

        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(backend.counts().await.unwrap(), QueueCounts::default());
    }

    #[tokio::test]
    async fn test_undecodable_payload_parks() {
        let handler = Arc::new(Recording::default());
        let (worker, backend) = worker(handler.clone());
        backend.enqueue("bad", "not json".to_string()).await.unwrap();

        worker.process_available().await.unwrap();

        assert!(handler.seen.lock().unwrap().is_empty());
        assert_eq!(backend.counts().await.unwrap().parked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sweep_respects_lock() {
        let handler = Arc::new(Recording::default());
        let (worker, backend) = worker(handler);
        let coordinator = Arc::new(MemoryCoordinator::new());
        let worker = worker.with_coordinator(coordinator.clone());

        backend.enqueue("ctx", "{\"value\":1}".to_string()).await.unwrap();
        backend.reserve(Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        coordinator.acquire("work:stalled-check", Some(60)).await.unwrap();
        worker.sweep_stalled().await;
        assert_eq!(backend.counts().await.unwrap().active, 1);

        coordinator.release("work:stalled-check").await.unwrap();
        worker.sweep_stalled().await;
        assert_eq!(backend.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_run_drains_until_shutdown() {
        let handler = Arc::new(Recording::default());
        let (worker, _) = worker(handler.clone());
        let queue = worker.runner.queue.clone();
        for i in 0..10u32 {
            queue.add(&format!("job-{}", i), &Work { value: i }).await.unwrap();
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = tokio::spawn(worker.run(shutdown_rx));

        for _ in 0..100 {
            if handler.seen.lock().unwrap().len() == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = shutdown_tx.send(());
        running.await.unwrap();

        let mut seen = handler.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
