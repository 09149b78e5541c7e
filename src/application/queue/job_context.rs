use tokio_util::sync::CancellationToken;

/// Per-invocation context a worker hands to a job handler (§4.1 detail
/// floor): cancellation, the per-attempt timeout, and a correlation id that
/// flows into logs, the job instance row, and any HTTP response triggered
/// by this run.
#[derive(Clone)]
pub struct JobContext {
    pub correlation_id: String,
    pub attempt: u32,
    pub cancellation: CancellationToken,
    pub timeout: std::time::Duration,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
