use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::queue::job_context::JobContext;
use crate::application::queue::manager::QueueManager;
use crate::application::queue::registry::JobRegistry;
use crate::domain::events::Event;
use crate::domain::scheduling::JobOutcome;
use crate::infrastructure::event_bus::EventBus;

/// N parallel worker tasks pulling from the `QueueManager` (§4.1, §5).
/// Bounded to `[2, 8]` by CPU count per the concurrency model; the sequence
/// evaluator runs on a separate pool (`application::planning`) so a flood
/// of evaluation work cannot starve ordinary jobs.
pub struct WorkerPool {
    queue: Arc<QueueManager>,
    registry: Arc<JobRegistry>,
    event_bus: Arc<EventBus>,
    worker_count: usize,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<QueueManager>,
        registry: Arc<JobRegistry>,
        event_bus: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(2, 8);
        Self {
            queue,
            registry,
            event_bus,
            worker_count,
            shutdown,
        }
    }

    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_worker(worker_id).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize) {
        info!(worker_id, "worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(worker_id, "worker shutting down");
                    return;
                }
                queued = self.queue.next() => {
                    self.process(worker_id, queued).await;
                }
            }
        }
    }

    async fn process(&self, worker_id: usize, mut queued: crate::application::queue::manager::QueuedJob) {
        let Some(spec) = self.registry.spec(&queued.instance.job_name).cloned() else {
            error!(job_name = %queued.instance.job_name, "no registry entry for job, dropping");
            return;
        };
        let Some(handler) = self.registry.handler(&queued.instance.job_name) else {
            error!(job_name = %queued.instance.job_name, "no handler for job, dropping");
            return;
        };

        queued.instance.started_at = Some(chrono::Utc::now());
        let mut attempt = queued.instance.retry_count + 1;

        loop {
            let ctx = JobContext {
                correlation_id: queued.instance.correlation_id.clone(),
                attempt,
                cancellation: self.shutdown.clone(),
                timeout: spec.per_attempt_timeout,
            };

            let run = tokio::time::timeout(
                spec.per_attempt_timeout,
                handler.run(ctx, queued.payload.clone()),
            )
            .await;

            match run {
                Ok(Ok(result)) => {
                    queued.instance.result_payload = Some(result.to_string());
                    info!(worker_id, job_name = %spec.name, attempt, "job completed");
                    self.queue
                        .record_outcome(queued.instance.clone(), JobOutcome::Ok)
                        .await;
                    self.event_bus.publish(Event::JobCompleted {
                        job_name: spec.name.to_string(),
                        outcome: JobOutcome::Ok.to_string(),
                    });
                    return;
                }
                Ok(Err(err)) => {
                    let retryable = spec.retries(err.kind()) && attempt < spec.max_attempts;
                    warn!(worker_id, job_name = %spec.name, attempt, error = %err, retryable, "job failed");
                    if retryable {
                        attempt += 1;
                        queued.instance.retry_count = attempt - 1;
                        tokio::time::sleep(backoff_with_jitter(attempt)).await;
                        continue;
                    }
                    queued.instance.error = Some(err.to_string());
                    self.queue
                        .record_outcome(queued.instance.clone(), JobOutcome::Failed)
                        .await;
                    self.event_bus.publish(Event::JobFailed {
                        job_name: spec.name.to_string(),
                        error_kind: err.kind().to_string(),
                    });
                    return;
                }
                Err(_elapsed) => {
                    let retryable = attempt < spec.max_attempts;
                    warn!(worker_id, job_name = %spec.name, attempt, retryable, "job attempt timed out");
                    if retryable {
                        attempt += 1;
                        queued.instance.retry_count = attempt - 1;
                        tokio::time::sleep(backoff_with_jitter(attempt)).await;
                        continue;
                    }
                    queued.instance.error = Some("timed out".to_string());
                    self.queue
                        .record_outcome(queued.instance.clone(), JobOutcome::Timeout)
                        .await;
                    self.event_bus.publish(Event::JobFailed {
                        job_name: spec.name.to_string(),
                        error_kind: "Timeout".to_string(),
                    });
                    return;
                }
            }
        }
    }
}

/// Exponential backoff (base 1s, cap 5min, jitter +/-20%) per §4.1.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_secs = 1u64.saturating_shl(attempt.min(10));
    let capped = base_secs.min(300);
    let jitter_pct = rand::rng().random_range(-0.2..=0.2);
    let jittered = (capped as f64) * (1.0 + jitter_pct);
    Duration::from_secs_f64(jittered.max(0.1))
}
