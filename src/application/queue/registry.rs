use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::queue::job_context::JobContext;
use crate::domain::errors::SentinelError;
use crate::domain::scheduling::JobSpec;

/// A job's actual work, keyed by `JobSpec::name` in the registry. Split from
/// `JobSpec` so the spec stays a plain data row (§9 design note) while the
/// handler carries whatever service dependencies it needs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: JobContext, payload: Value) -> Result<Value, SentinelError>;
}

/// Name -> (spec, handler) table. Adding a job means adding a row here, not
/// touching the worker pool or scheduler control flow.
#[derive(Clone, Default)]
pub struct JobRegistry {
    entries: HashMap<&'static str, (JobSpec, Arc<dyn JobHandler>)>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: JobSpec, handler: Arc<dyn JobHandler>) {
        self.entries.insert(spec.name, (spec, handler));
    }

    pub fn spec(&self, name: &str) -> Option<&JobSpec> {
        self.entries.get(name).map(|(spec, _)| spec)
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.entries.get(name).map(|(_, handler)| handler.clone())
    }

    pub fn scheduled_specs(&self) -> Vec<JobSpec> {
        self.entries
            .values()
            .filter(|(spec, _)| spec.cadence.is_some())
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}
