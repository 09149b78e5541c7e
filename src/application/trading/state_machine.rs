//! Event-driven trading loop (§4.5): IDLE -> AWAIT_PLAN -> CHECK_GUARDS ->
//! EXECUTE -> MONITOR -> IDLE, driven as an explicit state machine so each
//! transition matches the named state rather than living inline in one long
//! function.
//!
//! Daily P&L and drawdown have no dedicated read-path in `PortfolioRepository`
//! (it only ever writes equity snapshots), so this loop tracks them itself:
//! realized trade P&L accumulates into `CircuitBreakerState.daily_loss`
//! at fill time (`record_trade_result`), and a running peak equity in memory
//! backs the drawdown guard. Both reset is owned by `reconciliation.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{GuardViolation, SentinelError};
use crate::domain::events::Event;
use crate::domain::market::Venue;
use crate::domain::planning::Plan;
use crate::domain::ports::{BrokerClient, OrderStatus, OrderType};
use crate::domain::repositories::{
    LedgerRepository, PortfolioRepository, RecommendationRepository, SecurityRepository,
    SettingsRepository,
};
use crate::domain::risk::CircuitBreakerState;
use crate::domain::scheduling::Priority;
use crate::domain::settings::Settings;
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::{hash::portfolio_hash, OrderSide, Trade};

use crate::application::queue::QueueManager;
use crate::application::scheduler::market_hours::MarketHoursOracle;
use crate::infrastructure::event_bus::{recv_filtered, EventBus};

use super::guards::{check_guards, GuardCheck};
use super::reconciliation::{
    clear_circuit_breaker, daily_reconciliation, record_ledger_health_check, DailyReconciliationInput,
    ReconciliationReport,
};

const AWAIT_PLAN_TIMEOUT: StdDuration = StdDuration::from_secs(600);
const ORDER_FILL_TIMEOUT: StdDuration = StdDuration::from_secs(300);
const ORDER_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);
const MONITOR_FAST_POLL: StdDuration = StdDuration::from_secs(30);
const MONITOR_FAST_WINDOW: StdDuration = StdDuration::from_secs(300);
const MONITOR_SLOW_POLL: StdDuration = StdDuration::from_secs(60);
const MONITOR_SLOW_WINDOW: StdDuration = StdDuration::from_secs(900);

/// The five named states of §4.5, each carrying exactly what the next
/// transition needs.
#[derive(Debug, Clone)]
enum TradingState {
    Idle,
    AwaitPlan { portfolio_hash: String },
    CheckGuards { portfolio_hash: String, plan: Plan },
    Execute { portfolio_hash: String, plan: Plan },
    Monitor { portfolio_hash: String },
}

pub struct TradingLoop {
    ledger: Arc<dyn LedgerRepository>,
    portfolio_repo: Arc<dyn PortfolioRepository>,
    security_repo: Arc<dyn SecurityRepository>,
    settings_repo: Arc<dyn SettingsRepository>,
    recommendations: Arc<dyn RecommendationRepository>,
    broker: Arc<dyn BrokerClient>,
    event_bus: Arc<EventBus>,
    queue: Arc<QueueManager>,
    market_hours: Arc<MarketHoursOracle>,
    base_currency: String,

    circuit: Mutex<CircuitBreakerState>,
    peak_equity: Mutex<Decimal>,
    last_trade_at: Mutex<Option<DateTime<Utc>>>,
    last_buy_at: Mutex<HashMap<String, DateTime<Utc>>>,
    pending_order_ids: Mutex<Vec<String>>,
    /// Last trade written by `execute_state`, read back by the HTTP API's
    /// manual-execute endpoints (§6.2) since `execute_state` itself only
    /// returns the next `TradingState`.
    last_executed_trade: Mutex<Option<Trade>>,
}

/// Read-only view of the trading loop's state for the HTTP API's
/// `/system/status` and `/planner/status` endpoints (§6.2).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TradingStatusSnapshot {
    pub portfolio_hash: String,
    pub trading_mode: crate::domain::settings::TradingMode,
    pub halt_level: crate::domain::risk::HaltLevel,
    pub total_equity: Decimal,
    pub has_cached_plan: bool,
}

impl TradingLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        portfolio_repo: Arc<dyn PortfolioRepository>,
        security_repo: Arc<dyn SecurityRepository>,
        settings_repo: Arc<dyn SettingsRepository>,
        recommendations: Arc<dyn RecommendationRepository>,
        broker: Arc<dyn BrokerClient>,
        event_bus: Arc<EventBus>,
        queue: Arc<QueueManager>,
        market_hours: Arc<MarketHoursOracle>,
        base_currency: String,
        circuit: CircuitBreakerState,
    ) -> Self {
        Self {
            ledger,
            portfolio_repo,
            security_repo,
            settings_repo,
            recommendations,
            broker,
            event_bus,
            queue,
            market_hours,
            base_currency,
            circuit: Mutex::new(circuit),
            peak_equity: Mutex::new(Decimal::ZERO),
            last_trade_at: Mutex::new(None),
            last_buy_at: Mutex::new(HashMap::new()),
            pending_order_ids: Mutex::new(Vec::new()),
            last_executed_trade: Mutex::new(None),
        }
    }

    /// Runs the state machine until `cancellation` fires. Never returns an
    /// error upward -- a failed step logs and re-enters `IDLE`, matching the
    /// "user-visible failure in the trading loop never crashes the loop"
    /// rule (§7).
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        let mut state = TradingState::Idle;
        loop {
            if cancellation.is_cancelled() {
                info!("trading loop cancelled, exiting");
                return;
            }
            state = match self.step(state).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(error = %err, "trading loop step failed, returning to idle");
                    TradingState::Idle
                }
            };
        }
    }

    async fn step(&self, state: TradingState) -> Result<TradingState, SentinelError> {
        match state {
            TradingState::Idle => self.enter_idle().await,
            TradingState::AwaitPlan { portfolio_hash } => self.await_plan(portfolio_hash).await,
            TradingState::CheckGuards { portfolio_hash, plan } => {
                self.check_guards_state(portfolio_hash, plan).await
            }
            TradingState::Execute { portfolio_hash, plan } => {
                self.execute_state(portfolio_hash, plan).await
            }
            TradingState::Monitor { portfolio_hash } => self.monitor_state(portfolio_hash).await,
        }
    }

    async fn current_portfolio(&self) -> Result<(Portfolio, String), SentinelError> {
        let positions = self.portfolio_repo.positions().await?;
        let cash_balances = self.broker.get_cash_balances().await?;
        let securities = self.security_repo.active().await?;
        let pending = self.pending_order_ids.lock().await.clone();

        let mut portfolio = Portfolio::new();
        for position in positions {
            portfolio.positions.insert(position.security_id.clone(), position);
        }
        for balance in cash_balances {
            portfolio.cash_by_currency.insert(balance.currency, balance.amount);
        }
        portfolio.pending_order_ids = pending;

        let hash = portfolio_hash(&portfolio, &securities);
        Ok((portfolio, hash))
    }

    async fn enter_idle(&self) -> Result<TradingState, SentinelError> {
        let (_, hash) = self.current_portfolio().await?;
        Ok(TradingState::AwaitPlan { portfolio_hash: hash })
    }

    /// Fetches the cached recommendation for `portfolio_hash`, requesting one
    /// if absent or expired and waiting up to ten minutes for
    /// `recommendations_ready` before giving up for this cycle (§4.5).
    async fn await_plan(&self, portfolio_hash: String) -> Result<TradingState, SentinelError> {
        let now = Utc::now();
        if let Some(plan) = self.fetch_valid_plan(&portfolio_hash, now).await? {
            return Ok(TradingState::CheckGuards { portfolio_hash, plan });
        }

        let correlation_id = Uuid::new_v4().to_string();
        self.queue
            .enqueue_job(
                "planner_batch",
                serde_json::json!({ "portfolio_hash": portfolio_hash }),
                Priority::Normal,
                Some(format!("planner_batch|{portfolio_hash}")),
                &correlation_id,
            )
            .await;
        self.event_bus.publish(Event::PlanRequested {
            portfolio_hash: portfolio_hash.clone(),
        });

        let mut rx = self.event_bus.subscribe();
        let hash_for_filter = portfolio_hash.clone();
        let waited = tokio::time::timeout(
            AWAIT_PLAN_TIMEOUT,
            recv_filtered(&mut rx, move |event| {
                matches!(event, Event::RecommendationsReady { portfolio_hash } if *portfolio_hash == hash_for_filter)
            }),
        )
        .await;

        match waited {
            Ok(Some(_)) => {
                let now = Utc::now();
                match self.fetch_valid_plan(&portfolio_hash, now).await? {
                    Some(plan) => Ok(TradingState::CheckGuards { portfolio_hash, plan }),
                    None => Ok(TradingState::Idle),
                }
            }
            Ok(None) => Ok(TradingState::Idle),
            Err(_elapsed) => {
                warn!(%portfolio_hash, "await_plan timed out, re-enqueuing planner_batch");
                Ok(TradingState::Idle)
            }
        }
    }

    async fn fetch_valid_plan(
        &self,
        portfolio_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Plan>, SentinelError> {
        let Some(raw) = self.recommendations.get(portfolio_hash).await? else {
            return Ok(None);
        };
        let plan: Plan = serde_json::from_str(&raw)
            .map_err(|err| SentinelError::Integrity { store: "cache".into(), reason: err.to_string() })?;
        if plan.is_expired(now) || plan.current_step().is_none() {
            self.recommendations.invalidate(portfolio_hash).await?;
            return Ok(None);
        }
        Ok(Some(plan))
    }

    async fn check_guards_state(
        &self,
        portfolio_hash: String,
        plan: Plan,
    ) -> Result<TradingState, SentinelError> {
        let Some(step) = plan.current_step().cloned() else {
            self.recommendations.invalidate(&portfolio_hash).await?;
            return Ok(TradingState::Idle);
        };

        let settings = Settings::from_raw(&self.settings_repo.all().await?);
        let (portfolio, _) = self.current_portfolio().await?;
        let prices = self.current_prices(&portfolio);
        let equity = portfolio.total_equity(&prices, &self.base_currency);

        let mut peak = self.peak_equity.lock().await;
        if equity > *peak {
            *peak = equity;
        }
        let drawdown_pct = if *peak > Decimal::ZERO {
            (((*peak - equity) / *peak) * Decimal::from(100)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        drop(peak);

        let circuit = self.circuit.lock().await;
        let daily_loss_pct = if equity > Decimal::ZERO {
            ((circuit.daily_loss / equity) * Decimal::from(100)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        let security = self
            .security_repo
            .get(&step.step.security_id)
            .await?
            .ok_or_else(|| SentinelError::NotFound(step.step.security_id.clone()))?;
        let venue = Venue::from_currency(&security.currency);
        let now = Utc::now();
        let venue_open = venue.as_ref().map(|v| self.market_hours.is_open(v, now)).unwrap_or(false);
        let venue_flexible = venue.as_ref().map(|v| v.flexible_buy_hours()).unwrap_or(false);
        let venue_name = venue.as_ref().map(|v| format!("{v:?}")).unwrap_or_else(|| security.currency.clone());

        let per_symbol_loss = if step.step.side == OrderSide::Sell {
            portfolio.position(&step.step.security_id).and_then(|position| {
                if position.avg_cost <= Decimal::ZERO {
                    return None;
                }
                let loss_pct = ((position.avg_cost - step.step.expected_price) / position.avg_cost
                    * Decimal::from(100))
                .to_f64()
                .unwrap_or(0.0);
                Some((step.step.security_id.clone(), loss_pct.max(0.0), settings.per_symbol_loss_cap_pct))
            })
        } else {
            None
        };

        let cash_available = portfolio.cash(&step.step.currency);
        let cash_needed = if step.step.side == OrderSide::Buy {
            let notional = step.step.quantity * step.step.expected_price;
            notional * (Decimal::ONE + settings.cash_buffer_pct)
        } else {
            Decimal::ZERO
        };

        let last_trade_at = *self.last_trade_at.lock().await;
        let last_buy_at_for_symbol = self.last_buy_at.lock().await.get(&step.step.security_id).copied();

        let check = GuardCheck {
            settings: &settings,
            circuit: &circuit,
            daily_loss_pct,
            daily_loss_cap_pct: settings.daily_loss_cap_pct,
            drawdown_pct,
            drawdown_cap_pct: settings.drawdown_cap_pct,
            per_symbol_loss,
            last_trade_at,
            min_trade_interval: Duration::minutes(settings.min_trade_interval_minutes),
            last_buy_at_for_symbol,
            step_symbol: &step.step.security_id,
            step_side: step.step.side,
            venue_open,
            venue_flexible_buy_hours: venue_flexible,
            venue_name: &venue_name,
            cash_available,
            cash_needed,
            cash_currency: &step.step.currency,
            now,
        };

        match check_guards(&check) {
            Ok(()) => {
                drop(circuit);
                Ok(TradingState::Execute { portfolio_hash, plan })
            }
            Err(violation) => {
                drop(circuit);
                info!(%violation, %portfolio_hash, "guard blocked execution this cycle, waiting");
                if matches!(violation, GuardViolation::CircuitOpen { .. }) {
                    self.event_bus.publish(Event::CircuitOpen { trigger: violation.to_string() });
                }
                Ok(TradingState::Idle)
            }
        }
    }

    fn current_prices(&self, portfolio: &Portfolio) -> HashMap<String, Decimal> {
        portfolio
            .positions
            .values()
            .map(|p| (p.security_id.clone(), p.avg_cost))
            .collect()
    }

    async fn execute_state(&self, portfolio_hash: String, plan: Plan) -> Result<TradingState, SentinelError> {
        let Some(step) = plan.current_step().cloned() else {
            self.recommendations.invalidate(&portfolio_hash).await?;
            return Ok(TradingState::Monitor { portfolio_hash });
        };
        let action = &step.step;

        let mut order_id = match self
            .broker
            .place_order(&action.security_id, action.side, action.quantity, OrderType::Market, None)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, security_id = %action.security_id, "broker rejected order, invalidating plan");
                self.recommendations.invalidate(&portfolio_hash).await?;
                return Ok(TradingState::Idle);
            }
        };
        self.pending_order_ids.lock().await.push(order_id.clone());

        let mut retried = false;
        let fill = loop {
            match self.poll_for_fill(&order_id).await {
                Ok(Some(state)) => break Some(state),
                Ok(None) if !retried => {
                    retried = true;
                    warn!(%order_id, "order timed out awaiting fill, retrying once");
                    let _ = self.broker.cancel_order(&order_id).await;
                    self.pending_order_ids.lock().await.retain(|id| id != &order_id);
                    match self
                        .broker
                        .place_order(&action.security_id, action.side, action.quantity, OrderType::Market, None)
                        .await
                    {
                        Ok(id) => {
                            order_id = id;
                            self.pending_order_ids.lock().await.push(order_id.clone());
                            continue;
                        }
                        Err(err) => {
                            warn!(error = %err, "retry order placement failed, invalidating plan");
                            break None;
                        }
                    }
                }
                Ok(None) => break None,
                Err(err) => {
                    warn!(error = %err, %order_id, "error polling order state");
                    break None;
                }
            }
        };

        self.pending_order_ids.lock().await.retain(|id| id != &order_id);

        let Some(order_state) = fill else {
            self.recommendations.invalidate(&portfolio_hash).await?;
            return Ok(TradingState::Idle);
        };

        if !matches!(order_state.status, OrderStatus::Filled | OrderStatus::PartiallyFilled) {
            warn!(%order_id, status = ?order_state.status, "order did not fill, invalidating plan");
            self.recommendations.invalidate(&portfolio_hash).await?;
            return Ok(TradingState::Idle);
        }

        let price = order_state.avg_price.unwrap_or(action.expected_price);
        let filled_qty = if order_state.filled_quantity > Decimal::ZERO {
            order_state.filled_quantity
        } else {
            action.quantity
        };

        let position_before = {
            let (portfolio, _) = self.current_portfolio().await?;
            portfolio.position(&action.security_id).cloned()
        };

        let trade = Trade {
            trade_id: Uuid::new_v4().to_string(),
            security_id: action.security_id.clone(),
            side: action.side,
            quantity: filled_qty,
            price,
            fee: order_state.fee,
            currency: action.currency.clone(),
            executed_at: Utc::now(),
            broker_order_id: order_id.clone(),
        };
        self.ledger.append_trade(&trade).await?;
        *self.last_executed_trade.lock().await = Some(trade.clone());

        let mut portfolio = {
            let (p, _) = self.current_portfolio().await?;
            p
        };
        portfolio.apply_fill(&action.security_id, action.side, filled_qty, price, order_state.fee, &action.currency);
        if let Some(updated) = portfolio.position(&action.security_id) {
            self.portfolio_repo.upsert_position(updated).await?;
        }

        let pnl = match (action.side, &position_before) {
            (OrderSide::Sell, Some(before)) => (price - before.avg_cost) * filled_qty - order_state.fee,
            _ => Decimal::ZERO,
        };
        self.circuit.lock().await.record_trade_result(pnl);

        let now = Utc::now();
        *self.last_trade_at.lock().await = Some(now);
        if action.side == OrderSide::Buy {
            self.last_buy_at.lock().await.insert(action.security_id.clone(), now);
        }

        self.event_bus.publish(Event::TradeExecuted { trade_id: trade.trade_id.clone() });
        info!(trade_id = %trade.trade_id, security_id = %action.security_id, side = %action.side, "trade executed");

        let remaining = plan.remaining_after(step.step_index);
        if remaining.is_empty() {
            self.recommendations.invalidate(&portfolio_hash).await?;
        }

        Ok(TradingState::Monitor { portfolio_hash })
    }

    /// Polls `get_order` every `ORDER_POLL_INTERVAL` until a terminal state
    /// or `ORDER_FILL_TIMEOUT` elapses; `Ok(None)` means the wait timed out
    /// with the order still open.
    async fn poll_for_fill(
        &self,
        order_id: &str,
    ) -> Result<Option<crate::domain::ports::OrderState>, SentinelError> {
        let deadline = tokio::time::Instant::now() + ORDER_FILL_TIMEOUT;
        loop {
            let state = self.broker.get_order(order_id).await?;
            if !matches!(state.status, OrderStatus::Open) {
                return Ok(Some(state));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(ORDER_POLL_INTERVAL).await;
        }
    }

    /// Two-phase polling for a portfolio-hash change after a fill (§4.5):
    /// 30s cadence for five minutes, then 1 minute for fifteen more. Exits
    /// early the moment the hash moves so the loop re-enters `AWAIT_PLAN`
    /// against the post-trade portfolio rather than a stale one.
    async fn monitor_state(&self, baseline_hash: String) -> Result<TradingState, SentinelError> {
        let fast_deadline = tokio::time::Instant::now() + MONITOR_FAST_WINDOW;
        while tokio::time::Instant::now() < fast_deadline {
            tokio::time::sleep(MONITOR_FAST_POLL).await;
            let (_, hash) = self.current_portfolio().await?;
            if hash != baseline_hash {
                return Ok(TradingState::Idle);
            }
        }

        let slow_deadline = tokio::time::Instant::now() + MONITOR_SLOW_WINDOW;
        while tokio::time::Instant::now() < slow_deadline {
            tokio::time::sleep(MONITOR_SLOW_POLL).await;
            let (_, hash) = self.current_portfolio().await?;
            if hash != baseline_hash {
                return Ok(TradingState::Idle);
            }
        }

        Ok(TradingState::Idle)
    }

    /// Runs daily reconciliation (§4.6): pulls the broker's and ledger's cash
    /// views, stages a windfall cooldown if the trailing 30 days' realized
    /// P&L crossed the trigger, and emits `reconcile_alert` for any drift the
    /// auto-correct ceiling doesn't cover. Scheduled once daily by the
    /// `daily_reconciliation` job, never called from inside the state machine
    /// loop itself.
    pub async fn run_daily_reconciliation(&self) -> Result<ReconciliationReport, SentinelError> {
        let now = Utc::now();
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or(now);

        let broker_cash: HashMap<String, Decimal> = self
            .broker
            .get_cash_balances()
            .await?
            .into_iter()
            .map(|b| (b.currency, b.amount))
            .collect();

        let trades = self.ledger.trades_since(epoch).await?;
        let cash_flows = self.ledger.cash_flows_since(epoch).await?;
        let mut ledger_cash: HashMap<String, Decimal> = HashMap::new();
        for trade in &trades {
            *ledger_cash.entry(trade.currency.clone()).or_insert(Decimal::ZERO) += trade.signed_cash_delta();
        }
        for flow in &cash_flows {
            *ledger_cash.entry(flow.currency.clone()).or_insert(Decimal::ZERO) += flow.amount;
        }

        let (portfolio, _) = self.current_portfolio().await?;
        let prices = self.current_prices(&portfolio);
        let equity = portfolio.total_equity(&prices, &self.base_currency);
        let window_start = now - Duration::days(30);
        let realized_pnl: Decimal = trades
            .iter()
            .filter(|t| t.executed_at >= window_start)
            .map(|t| t.signed_cash_delta())
            .sum();
        let monthly_return_pct = if equity > Decimal::ZERO {
            (realized_pnl / equity) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let report = daily_reconciliation(&DailyReconciliationInput {
            broker_cash: &broker_cash,
            ledger_cash: &ledger_cash,
            monthly_return_pct,
            now,
        });

        if report.needs_alert() {
            self.event_bus.publish(Event::ReconcileAlert {
                kind: "cash_drift".to_string(),
                detail: format!(
                    "{} of {} currency drift(s) exceeded the auto-correct ceiling",
                    report.drifts.iter().filter(|d| !d.auto_corrected).count(),
                    report.drifts.len()
                ),
            });
        }

        record_ledger_health_check(&mut *self.circuit.lock().await, true);

        Ok(report)
    }

    /// Records the broker health probe against the circuit breaker's ledger
    /// health trigger (§4.1, §4.6): an unhealthy broker reads as `FullHalt`
    /// until the next successful check clears it.
    pub async fn run_health_check(&self) -> Result<bool, SentinelError> {
        let health = self.broker.health().await?;
        record_ledger_health_check(&mut *self.circuit.lock().await, health.ok);
        Ok(health.ok)
    }

    /// Read-only snapshot for the HTTP API (§6.2): current portfolio hash,
    /// trading mode, effective circuit breaker level, and whether a cached
    /// plan already exists for that hash. Never mutates state.
    pub async fn status_snapshot(&self) -> Result<TradingStatusSnapshot, SentinelError> {
        let settings = Settings::from_raw(&self.settings_repo.all().await?);
        let (portfolio, hash) = self.current_portfolio().await?;
        let prices = self.current_prices(&portfolio);
        let total_equity = portfolio.total_equity(&prices, &self.base_currency);
        let halt_level = self.circuit.lock().await.effective_level();
        let has_cached_plan = self.fetch_valid_plan(&hash, Utc::now()).await?.is_some();
        Ok(TradingStatusSnapshot {
            portfolio_hash: hash,
            trading_mode: settings.trading_mode,
            halt_level,
            total_equity,
            has_cached_plan,
        })
    }

    /// Clears the circuit breaker (§4.6: "pause is lifted only by explicit
    /// operator action"). Backs the admin-only HTTP endpoint; callers are
    /// responsible for any access control around invoking it.
    pub async fn resume(&self) {
        clear_circuit_breaker(&mut *self.circuit.lock().await);
        self.event_bus.publish(Event::CircuitClosed);
    }

    /// Manually runs `CHECK_GUARDS` then `EXECUTE` for the current portfolio
    /// hash's cached plan, outside the long-lived loop's own polling cycle.
    /// Backs `POST /trades/execute` and `POST /trades/recommendations/execute`
    /// (§6.2), both of which are rejected in research mode before a single
    /// broker call is made.
    pub async fn execute_plan_now(&self) -> Result<Trade, SentinelError> {
        let settings = Settings::from_raw(&self.settings_repo.all().await?);
        if settings.trading_mode == crate::domain::settings::TradingMode::Research {
            return Err(SentinelError::PolicyViolation(
                GuardViolation::ResearchMode.to_string(),
            ));
        }

        let (_, hash) = self.current_portfolio().await?;
        let plan = self
            .fetch_valid_plan(&hash, Utc::now())
            .await?
            .ok_or_else(|| SentinelError::NotFound(format!("no cached plan for hash {hash}")))?;

        match self.check_guards_state(hash.clone(), plan.clone()).await? {
            TradingState::Execute { portfolio_hash, plan } => {
                self.execute_state(portfolio_hash, plan).await?;
            }
            _ => {
                return Err(SentinelError::PolicyViolation(
                    "a guard blocked execution; see logs for the specific rule".to_string(),
                ));
            }
        }

        self.last_executed_trade
            .lock()
            .await
            .clone()
            .ok_or_else(|| SentinelError::UpstreamRejected("order did not reach a filled state".to_string()))
    }
}
