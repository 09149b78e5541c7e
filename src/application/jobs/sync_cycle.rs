//! `sync_cycle`: pulls broker truth (positions, cash, trades, cash flows)
//! into the `portfolio`/`ledger` stores and fires the event chain that
//! drives the planning pipeline on change (§2 data flow, §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::application::queue::{JobContext, JobHandler, QueueManager};
use crate::domain::errors::SentinelError;
use crate::domain::events::Event;
use crate::domain::ports::BrokerClient;
use crate::domain::repositories::{LedgerRepository, PortfolioRepository};
use crate::domain::scheduling::Priority;
use crate::domain::trading::{portfolio_hash, Portfolio};
use crate::infrastructure::event_bus::EventBus;

pub struct SyncCycleJob {
    broker: Arc<dyn BrokerClient>,
    portfolio_repo: Arc<dyn PortfolioRepository>,
    ledger_repo: Arc<dyn LedgerRepository>,
    event_bus: Arc<EventBus>,
    queue: Arc<QueueManager>,
    base_currency: String,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_hash: Mutex<Option<String>>,
}

impl SyncCycleJob {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        portfolio_repo: Arc<dyn PortfolioRepository>,
        ledger_repo: Arc<dyn LedgerRepository>,
        event_bus: Arc<EventBus>,
        queue: Arc<QueueManager>,
        base_currency: String,
    ) -> Self {
        Self {
            broker,
            portfolio_repo,
            ledger_repo,
            event_bus,
            queue,
            base_currency,
            last_sync: Mutex::new(None),
            last_hash: Mutex::new(None),
        }
    }
}

#[async_trait]
impl JobHandler for SyncCycleJob {
    async fn run(&self, ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let positions = self.broker.get_portfolio().await?;
        for position in &positions {
            self.portfolio_repo.upsert_position(position).await?;
        }

        let since = self
            .last_sync
            .lock()
            .await
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is a valid timestamp"));

        for trade in self.broker.get_trade_history(since).await? {
            match self.ledger_repo.append_trade(&trade).await {
                Ok(()) | Err(SentinelError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        for cash_flow in self.broker.get_cash_flows(since).await? {
            self.ledger_repo.append_cash_flow(&cash_flow).await?;
        }
        *self.last_sync.lock().await = Some(Utc::now());

        let cash_by_currency: HashMap<String, rust_decimal::Decimal> = self
            .broker
            .get_cash_balances()
            .await?
            .into_iter()
            .map(|c| (c.currency, c.amount))
            .collect();

        // Cash is persisted as a `CASH:<CCY>` position (§2 glossary) so
        // downstream jobs that only hold a `PortfolioRepository` handle --
        // `planner_batch` has no broker dependency -- can reconstruct the
        // full portfolio, cash included, from stored positions alone.
        for (ccy, amount) in &cash_by_currency {
            let mut cash_position = crate::domain::trading::Position::new(
                format!("{}{}", crate::domain::securities::CASH_SYMBOL_PREFIX, ccy),
                *amount,
                rust_decimal::Decimal::ONE,
            );
            cash_position.market_value = *amount;
            self.portfolio_repo.upsert_position(&cash_position).await?;
        }

        // `cash_by_currency` already carries the CASH:<CCY> rows just
        // persisted above; excluded here so `total_equity` doesn't count
        // cash twice (once via the cash map, once via the position).
        let stored_positions = self.portfolio_repo.positions().await?;
        let portfolio = Portfolio {
            positions: stored_positions
                .into_iter()
                .filter(|p| !p.security_id.starts_with(crate::domain::securities::CASH_SYMBOL_PREFIX))
                .map(|p| (p.security_id.clone(), p))
                .collect(),
            cash_by_currency,
            pending_order_ids: Vec::new(),
        };

        let hash = portfolio_hash(&portfolio, &[]);
        let equity = portfolio.total_equity(&HashMap::new(), &self.base_currency);
        self.portfolio_repo.snapshot(Utc::now(), equity).await?;

        let mut last_hash = self.last_hash.lock().await;
        let changed = last_hash.as_deref() != Some(hash.as_str());
        if changed {
            self.event_bus.publish(Event::PortfolioChanged {
                portfolio_hash: hash.clone(),
            });
            self.event_bus.publish(Event::PlanRequested {
                portfolio_hash: hash.clone(),
            });
            self.queue
                .enqueue_job(
                    "planner_batch",
                    json!({ "portfolio_hash": hash }),
                    Priority::Normal,
                    Some(format!("planner_batch|{hash}")),
                    &ctx.correlation_id,
                )
                .await;
            *last_hash = Some(hash.clone());
        }

        Ok(json!({ "portfolio_hash": hash, "changed": changed }))
    }
}
