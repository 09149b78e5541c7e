//! `price_sync`: pulls the day's OHLCV bar for every active security into
//! the `history` store (§2, §3). Invalidates the score cache indirectly --
//! scorers read through `history`, not a cache of their own, so there is
//! nothing further to evict here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::queue::{JobContext, JobHandler};
use crate::domain::errors::SentinelError;
use crate::domain::ports::MarketDataClient;
use crate::domain::repositories::{HistoryRepository, SecurityRepository};

pub struct PriceSyncJob {
    security_repo: Arc<dyn SecurityRepository>,
    market_data: Arc<dyn MarketDataClient>,
    history_repo: Arc<dyn HistoryRepository>,
}

impl PriceSyncJob {
    pub fn new(
        security_repo: Arc<dyn SecurityRepository>,
        market_data: Arc<dyn MarketDataClient>,
        history_repo: Arc<dyn HistoryRepository>,
    ) -> Self {
        Self {
            security_repo,
            market_data,
            history_repo,
        }
    }
}

#[async_trait]
impl JobHandler for PriceSyncJob {
    async fn run(&self, _ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let securities = self.security_repo.active().await?;
        let now = Utc::now();
        let range = (now - Duration::days(5), now);

        let mut synced = 0usize;
        let mut failed = 0usize;
        for security in securities.iter().filter(|s| !s.is_cash()) {
            match self.market_data.get_ohlcv(&security.security_id, range).await {
                Ok(bars) => {
                    for bar in bars {
                        self.history_repo.append_bar(&security.security_id, &bar).await?;
                    }
                    synced += 1;
                }
                Err(err) if err.retryable() => return Err(err),
                Err(err) => {
                    warn!(security_id = %security.security_id, error = %err, "price_sync: skipping security");
                    failed += 1;
                }
            }
        }

        info!(synced, failed, "price_sync completed");
        Ok(json!({ "synced": synced, "failed": failed }))
    }
}
