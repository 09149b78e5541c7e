//! Background job queue, worker pool, and job registry (§4.1).

pub mod job_context;
pub mod manager;
pub mod registry;
pub mod worker_pool;

pub use job_context::JobContext;
pub use manager::{QueueManager, QueuedJob};
pub use registry::{JobHandler, JobRegistry};
pub use worker_pool::WorkerPool;
