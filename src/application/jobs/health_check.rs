//! `health_check`: probes broker connectivity and feeds the result into the
//! trading loop's `ledger` health circuit-breaker trigger (§4.1, §4.6). One
//! of the three independent triggers that can pause all execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::queue::{JobContext, JobHandler};
use crate::application::trading::TradingLoop;
use crate::domain::errors::SentinelError;

pub struct HealthCheckJob {
    trading_loop: Arc<TradingLoop>,
}

impl HealthCheckJob {
    pub fn new(trading_loop: Arc<TradingLoop>) -> Self {
        Self { trading_loop }
    }
}

#[async_trait]
impl JobHandler for HealthCheckJob {
    async fn run(&self, _ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let healthy = self.trading_loop.run_health_check().await?;
        if healthy {
            info!("health_check: broker healthy");
        } else {
            warn!("health_check: broker unhealthy, ledger circuit-breaker trigger armed");
        }
        Ok(json!({ "healthy": healthy }))
    }
}
