//! `daily_reconciliation`: scheduled once daily at 04:00 local (§4.6).
//! Delegates the actual comparison to `TradingLoop::run_daily_reconciliation`
//! so the pure reconciliation math stays unit-testable without a job
//! context, and only the scheduling/outcome-recording wrapper lives here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::application::queue::{JobContext, JobHandler};
use crate::application::trading::TradingLoop;
use crate::domain::errors::SentinelError;

pub struct DailyReconciliationJob {
    trading_loop: Arc<TradingLoop>,
}

impl DailyReconciliationJob {
    pub fn new(trading_loop: Arc<TradingLoop>) -> Self {
        Self { trading_loop }
    }
}

#[async_trait]
impl JobHandler for DailyReconciliationJob {
    async fn run(&self, _ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let report = self.trading_loop.run_daily_reconciliation().await?;
        info!(
            drifts = report.drifts.len(),
            needs_alert = report.needs_alert(),
            windfall_cooldown = report.windfall_cooldown.is_some(),
            "daily_reconciliation completed"
        );
        Ok(json!({
            "drifts": report.drifts.len(),
            "needs_alert": report.needs_alert(),
            "windfall_cooldown": report.windfall_cooldown.is_some(),
        }))
    }
}
