use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::queue::{JobRegistry, QueueManager};
use crate::application::scheduler::market_hours::MarketHoursOracle;
use crate::domain::scheduling::MarketGate;

/// Converts cron-like triggers into queue enqueues, market-aware (§4.2).
/// Ticks at 1 Hz; for each scheduled job checks whether "now" crosses its
/// next-fire boundary and its market gate is satisfied, enqueuing with a
/// stable `dedupe_key = job_name|fire_instant` so a delayed tick cannot
/// double-schedule the same fire.
pub struct TimeScheduler {
    registry: Arc<JobRegistry>,
    queue: Arc<QueueManager>,
    oracle: Arc<MarketHoursOracle>,
    last_fired: tokio::sync::Mutex<HashMap<&'static str, DateTime<Utc>>>,
}

impl TimeScheduler {
    pub fn new(registry: Arc<JobRegistry>, queue: Arc<QueueManager>, oracle: Arc<MarketHoursOracle>) -> Self {
        Self {
            registry,
            queue,
            oracle,
            last_fired: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("time scheduler shutting down");
                        return;
                    }
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }

    async fn tick(&self) {
        let now = Utc::now();
        let specs = self.registry.scheduled_specs();
        let mut last_fired = self.last_fired.lock().await;

        for spec in specs {
            let Some(cadence) = spec.cadence else { continue };
            if !self.gate_satisfied(spec.market_gate, now) {
                continue;
            }
            let last = last_fired.get(spec.name).copied();
            if !cadence.crosses_boundary(now, last) {
                continue;
            }

            let fire_instant = now.timestamp();
            let dedupe_key = format!("{}|{}", spec.name, fire_instant);
            self.queue
                .enqueue_job(
                    spec.name,
                    json!({}),
                    spec.priority,
                    Some(dedupe_key),
                    &uuid::Uuid::new_v4().to_string(),
                )
                .await;
            last_fired.insert(spec.name, now);
            debug!(job_name = spec.name, "scheduler fired job");
        }
    }

    fn gate_satisfied(&self, gate: MarketGate, now: DateTime<Utc>) -> bool {
        match gate {
            MarketGate::Always => true,
            MarketGate::MarketOpenDominant => self.oracle.dominant_markets_open(now),
            MarketGate::MarketOpenAny => self.oracle.any_market_open(now),
            MarketGate::MarketClosed => !self.oracle.any_market_open(now),
        }
    }
}
