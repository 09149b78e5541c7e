use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobOutcome {
    Ok,
    Failed,
    Cancelled,
    Timeout,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobOutcome::Ok => "ok",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Persisted job execution record (§3), written to the `cache` store for
/// history/monitoring with bounded retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: String,
    pub job_name: String,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
    pub retry_count: u32,
    pub correlation_id: String,
    pub result_payload: Option<String>,
    pub error: Option<String>,
}

impl JobInstance {
    pub fn queued(job_name: &str, correlation_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_name: job_name.to_string(),
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            outcome: None,
            retry_count: 0,
            correlation_id: correlation_id.to_string(),
            result_payload: None,
            error: None,
        }
    }
}
