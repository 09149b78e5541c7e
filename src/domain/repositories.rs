use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::errors::SentinelError;
use crate::domain::scheduling::JobInstance;
use crate::domain::securities::Security;
use crate::domain::trading::{CashFlow, Position, Trade};

/// `universe` store: tradable securities, country/industry groups (§2, §3).
#[async_trait]
pub trait SecurityRepository: Send + Sync {
    async fn upsert(&self, security: &Security) -> Result<(), SentinelError>;
    async fn get(&self, security_id: &str) -> Result<Option<Security>, SentinelError>;
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Security>, SentinelError>;
    async fn active(&self) -> Result<Vec<Security>, SentinelError>;
    async fn all(&self) -> Result<Vec<Security>, SentinelError>;
    async fn deactivate(&self, security_id: &str) -> Result<(), SentinelError>;
}

/// `config` store: hot-readable settings and allocation targets (§6.4).
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn all(&self) -> Result<HashMap<String, String>, SentinelError>;
    async fn get(&self, key: &str) -> Result<Option<String>, SentinelError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SentinelError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationTarget {
    pub group_kind: AllocationGroupKind,
    pub group_key: String,
    pub min_weight: Decimal,
    pub max_weight: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationGroupKind {
    Country,
    Industry,
}

#[async_trait]
pub trait AllocationTargetRepository: Send + Sync {
    async fn all(&self) -> Result<Vec<AllocationTarget>, SentinelError>;
    async fn upsert(&self, target: &AllocationTarget) -> Result<(), SentinelError>;
}

/// `ledger` store: append-only trades and cash flows (§3). Writes must flow
/// through `append_trade`/`append_cash_flow` so the duplicate guard named in
/// §4.5 has a single enforcement point.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn append_trade(&self, trade: &Trade) -> Result<(), SentinelError>;
    async fn append_cash_flow(&self, cash_flow: &CashFlow) -> Result<(), SentinelError>;
    async fn trades_since(&self, since: DateTime<Utc>) -> Result<Vec<Trade>, SentinelError>;
    async fn cash_flows_since(&self, since: DateTime<Utc>) -> Result<Vec<CashFlow>, SentinelError>;
    async fn trade_by_broker_order_id(
        &self,
        broker_order_id: &str,
    ) -> Result<Option<Trade>, SentinelError>;
    async fn last_trade_at(&self) -> Result<Option<DateTime<Utc>>, SentinelError>;
}

/// `portfolio` store: positions, scores, metrics, periodic snapshots (§3).
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn positions(&self) -> Result<Vec<Position>, SentinelError>;
    async fn upsert_position(&self, position: &Position) -> Result<(), SentinelError>;
    async fn get_metric(
        &self,
        security_id: &str,
        metric_name: &str,
        as_of: chrono::NaiveDate,
    ) -> Result<Option<Decimal>, SentinelError>;
    async fn set_metric(
        &self,
        security_id: &str,
        metric_name: &str,
        as_of: chrono::NaiveDate,
        value: Decimal,
    ) -> Result<(), SentinelError>;
    async fn snapshot(&self, as_of: DateTime<Utc>, total_equity: Decimal) -> Result<(), SentinelError>;
}

/// `history` store: per-symbol daily OHLCV + FX rates (§2).
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append_bar(
        &self,
        security_id: &str,
        bar: &crate::domain::ports::Ohlcv,
    ) -> Result<(), SentinelError>;
    async fn bars(
        &self,
        security_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<crate::domain::ports::Ohlcv>, SentinelError>;
    async fn fx_rate(
        &self,
        base: &str,
        quote: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Decimal>, SentinelError>;
    async fn set_fx_rate(
        &self,
        base: &str,
        quote: &str,
        as_of: DateTime<Utc>,
        rate: Decimal,
    ) -> Result<(), SentinelError>;
}

/// `cache` store: ephemeral recommendations and job execution history (§3).
#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn put(
        &self,
        portfolio_hash: &str,
        plan_json: &str,
        ttl: chrono::Duration,
    ) -> Result<(), SentinelError>;
    async fn get(&self, portfolio_hash: &str) -> Result<Option<String>, SentinelError>;
    async fn invalidate(&self, portfolio_hash: &str) -> Result<(), SentinelError>;
    async fn evict_expired(&self) -> Result<u64, SentinelError>;
}

#[async_trait]
pub trait JobInstanceRepository: Send + Sync {
    async fn insert(&self, instance: &JobInstance) -> Result<(), SentinelError>;
    async fn record_outcome(&self, instance: &JobInstance) -> Result<(), SentinelError>;
    async fn recent(&self, job_name: &str, limit: u32) -> Result<Vec<JobInstance>, SentinelError>;
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, SentinelError>;
}

/// `client_data` store: external API response cache with per-domain TTLs (§2).
#[async_trait]
pub trait ClientDataCacheRepository: Send + Sync {
    async fn get(&self, domain: &str, key: &str) -> Result<Option<String>, SentinelError>;
    async fn put(
        &self,
        domain: &str,
        key: &str,
        value: &str,
        ttl: chrono::Duration,
    ) -> Result<(), SentinelError>;
}
