//! Concrete `JobHandler`s registered into the queue's job table (§4.1,
//! §4.4). Each module is one row in the registry built by
//! `application::bootstrap::build_registry` -- adding a job means adding a
//! module here and a row there, never touching worker pool or scheduler
//! control flow (§9 design note).

pub mod backup_snapshot;
pub mod daily_reconciliation;
pub mod health_check;
pub mod job_history_prune;
pub mod planner_batch;
pub mod price_sync;
pub mod recommendation_gc;
pub mod sync_cycle;
pub mod universe_sync;
