use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::domain::repositories::JobInstanceRepository;
use crate::domain::scheduling::{JobInstance, JobOutcome, Priority};

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub instance: JobInstance,
    pub payload: Value,
    pub priority: Priority,
    pub dedupe_key: Option<String>,
}

struct QueueState {
    critical: VecDeque<QueuedJob>,
    normal: VecDeque<QueuedJob>,
    background: VecDeque<QueuedJob>,
    dedupe_keys: HashSet<String>,
}

impl QueueState {
    fn queue_for(&mut self, priority: Priority) -> &mut VecDeque<QueuedJob> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::Normal => &mut self.normal,
            Priority::Background => &mut self.background,
        }
    }
}

/// Consecutive-failure tracker per job name, windowed, per §4.1 detail
/// floor: "5 failures per 1h" triggers an alert, resetting on any success.
struct FailureWindow {
    failures: VecDeque<DateTime<Utc>>,
}

/// In-memory FIFO-within-priority job queue (§4.1). Three priority classes,
/// a job enqueued with a `dedupe_key` matching an already-queued (not yet
/// started) job collapses into the existing entry rather than duplicating.
pub struct QueueManager {
    state: Mutex<QueueState>,
    notify: Notify,
    failure_windows: Mutex<HashMap<String, FailureWindow>>,
    job_instances: Arc<dyn JobInstanceRepository>,
    alert_threshold: usize,
    alert_window: Duration,
}

impl QueueManager {
    pub fn new(job_instances: Arc<dyn JobInstanceRepository>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                critical: VecDeque::new(),
                normal: VecDeque::new(),
                background: VecDeque::new(),
                dedupe_keys: HashSet::new(),
            }),
            notify: Notify::new(),
            failure_windows: Mutex::new(HashMap::new()),
            job_instances,
            alert_threshold: 5,
            alert_window: Duration::hours(1),
        }
    }

    /// Enqueues a job, returning the instance id that now represents this
    /// unit of work -- either a freshly created instance or the existing
    /// one its `dedupe_key` collapsed into.
    pub async fn enqueue_job(
        &self,
        job_name: &str,
        payload: Value,
        priority: Priority,
        dedupe_key: Option<String>,
        correlation_id: &str,
    ) -> String {
        let mut state = self.state.lock().await;
        if let Some(key) = &dedupe_key
            && state.dedupe_keys.contains(key)
        {
            let queue = state.queue_for(priority);
            if let Some(existing) = queue.iter().find(|job| job.dedupe_key.as_deref() == Some(key.as_str())) {
                return existing.instance.id.clone();
            }
        }

        let instance = JobInstance::queued(job_name, correlation_id);
        let instance_id = instance.id.clone();
        let job = QueuedJob {
            instance,
            payload,
            priority,
            dedupe_key: dedupe_key.clone(),
        };
        if let Some(key) = dedupe_key {
            state.dedupe_keys.insert(key);
        }
        state.queue_for(priority).push_back(job);
        drop(state);
        self.notify.notify_one();
        instance_id
    }

    /// Blocks until a job is available, returning the highest-priority one
    /// FIFO within its class (critical before normal before background).
    pub async fn next(&self) -> QueuedJob {
        loop {
            {
                let mut state = self.state.lock().await;
                for priority in [Priority::Critical, Priority::Normal, Priority::Background] {
                    if let Some(job) = state.queue_for(priority).pop_front() {
                        if let Some(key) = &job.dedupe_key {
                            state.dedupe_keys.remove(key);
                        }
                        return job;
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn record_outcome(&self, mut instance: JobInstance, outcome: JobOutcome) {
        instance.finished_at = Some(Utc::now());
        instance.outcome = Some(outcome);
        if let Err(err) = self.job_instances.record_outcome(&instance).await {
            warn!(job_name = %instance.job_name, error = %err, "failed to persist job outcome");
        }
        self.track_failure_window(&instance.job_name, outcome).await;
    }

    async fn track_failure_window(&self, job_name: &str, outcome: JobOutcome) {
        let mut windows = self.failure_windows.lock().await;
        let window = windows.entry(job_name.to_string()).or_insert_with(|| FailureWindow {
            failures: VecDeque::new(),
        });
        match outcome {
            JobOutcome::Ok => window.failures.clear(),
            JobOutcome::Failed | JobOutcome::Timeout | JobOutcome::Cancelled => {
                let now = Utc::now();
                window.failures.push_back(now);
                while let Some(front) = window.failures.front() {
                    if now - *front > self.alert_window {
                        window.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if window.failures.len() >= self.alert_threshold {
                    warn!(
                        job_name,
                        count = window.failures.len(),
                        "job failure threshold exceeded within window"
                    );
                }
            }
        }
    }

    pub async fn depth(&self) -> usize {
        let state = self.state.lock().await;
        state.critical.len() + state.normal.len() + state.background.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::repositories::job_instance::InMemoryJobInstanceRepository;

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(InMemoryJobInstanceRepository::new()))
    }

    #[tokio::test]
    async fn dedupe_key_collapses_duplicate_enqueue() {
        let qm = manager();
        let id1 = qm
            .enqueue_job("sync", Value::Null, Priority::Normal, Some("sync|t1".into()), "c1")
            .await;
        let id2 = qm
            .enqueue_job("sync", Value::Null, Priority::Normal, Some("sync|t1".into()), "c2")
            .await;
        assert_eq!(id1, id2);
        assert_eq!(qm.depth().await, 1);
    }

    #[tokio::test]
    async fn critical_drains_before_normal() {
        let qm = manager();
        qm.enqueue_job("bg", Value::Null, Priority::Background, None, "c1").await;
        qm.enqueue_job("crit", Value::Null, Priority::Critical, None, "c2").await;
        let job = qm.next().await;
        assert_eq!(job.instance.job_name, "crit");
    }

    #[tokio::test]
    async fn fifo_within_priority_class() {
        let qm = manager();
        qm.enqueue_job("first", Value::Null, Priority::Normal, None, "c1").await;
        qm.enqueue_job("second", Value::Null, Priority::Normal, None, "c2").await;
        let job = qm.next().await;
        assert_eq!(job.instance.job_name, "first");
    }
}
