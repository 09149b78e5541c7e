//! `planner_batch`: runs the full planning pipeline (§4.4) -- optimizer,
//! opportunity identifier, filters, sequence generator, sequence evaluator,
//! plan builder -- and caches the winning plan for the trading loop's
//! `AWAIT_PLAN` state to pick up. Enqueued both on demand (chained from
//! `sync_cycle` on a portfolio hash change) and by the time scheduler as a
//! fallback so a dropped event never leaves a portfolio without a plan for
//! long. Has no broker dependency: the portfolio is reconstructed from
//! `PortfolioRepository` alone, cash included via the `CASH:<CCY>`
//! convention (§2 glossary).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nalgebra::DMatrix;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::application::planning::{
    apply_eligibility_filters, build_plan, evaluate_sequences, filter_correlation_aware,
    filter_diversity_top_k, generate_sequences, identify_opportunities, optimize, EligibilityInput,
    EvaluatorInput, GenerationContext, OpportunityIdentifierInput, OptimizerInput, SecurityMeta,
    SecuritySignal,
};
use crate::application::queue::{JobContext, JobHandler};
use crate::application::scheduler::market_hours::MarketHoursOracle;
use crate::domain::errors::SentinelError;
use crate::domain::events::Event;
use crate::domain::market::Venue;
use crate::domain::ports::MarketDataClient;
use crate::domain::repositories::{
    AllocationGroupKind, AllocationTargetRepository, HistoryRepository, PortfolioRepository,
    RecommendationRepository, SecurityRepository, SettingsRepository,
};
use crate::domain::securities::{Security, CASH_SYMBOL_PREFIX};
use crate::domain::settings::Settings;
use crate::domain::trading::{portfolio_hash, FixedPercentFeeModel, Portfolio};
use crate::infrastructure::event_bus::EventBus;

const RETURNS_WINDOW_DAYS: i64 = 90;
const MONTE_CARLO_PATHS: usize = 2_000;

#[allow(clippy::too_many_arguments)]
pub struct PlannerBatchJob {
    security_repo: Arc<dyn SecurityRepository>,
    settings_repo: Arc<dyn SettingsRepository>,
    allocation_repo: Arc<dyn AllocationTargetRepository>,
    portfolio_repo: Arc<dyn PortfolioRepository>,
    history_repo: Arc<dyn HistoryRepository>,
    recommendation_repo: Arc<dyn RecommendationRepository>,
    market_data: Arc<dyn MarketDataClient>,
    market_hours: Arc<MarketHoursOracle>,
    event_bus: Arc<EventBus>,
    base_currency: String,
}

impl PlannerBatchJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        security_repo: Arc<dyn SecurityRepository>,
        settings_repo: Arc<dyn SettingsRepository>,
        allocation_repo: Arc<dyn AllocationTargetRepository>,
        portfolio_repo: Arc<dyn PortfolioRepository>,
        history_repo: Arc<dyn HistoryRepository>,
        recommendation_repo: Arc<dyn RecommendationRepository>,
        market_data: Arc<dyn MarketDataClient>,
        market_hours: Arc<MarketHoursOracle>,
        event_bus: Arc<EventBus>,
        base_currency: String,
    ) -> Self {
        Self {
            security_repo,
            settings_repo,
            allocation_repo,
            portfolio_repo,
            history_repo,
            recommendation_repo,
            market_data,
            market_hours,
            event_bus,
            base_currency,
        }
    }

    /// Rebuilds the current portfolio purely from stored positions, the
    /// same split `sync_cycle` already performs inline before it ever calls
    /// this job.
    async fn load_portfolio(&self) -> Result<Portfolio, SentinelError> {
        let stored = self.portfolio_repo.positions().await?;
        let mut cash_by_currency = HashMap::new();
        let mut positions = HashMap::new();
        for position in stored {
            match position.security_id.strip_prefix(CASH_SYMBOL_PREFIX) {
                Some(ccy) => {
                    cash_by_currency.insert(ccy.to_string(), position.quantity);
                }
                None => {
                    positions.insert(position.security_id.clone(), position);
                }
            }
        }
        Ok(Portfolio {
            positions,
            cash_by_currency,
            pending_order_ids: Vec::new(),
        })
    }

    /// Trailing daily close-to-close returns per security over
    /// `RETURNS_WINDOW_DAYS`, plus each security's latest close price.
    /// Securities with fewer than two bars are dropped from the matrix --
    /// the optimizer needs at least one return to estimate anything.
    async fn load_returns(
        &self,
        security_ids: &[&str],
    ) -> Result<(Vec<String>, DMatrix<f64>, HashMap<String, Decimal>), SentinelError> {
        let now = Utc::now();
        let range = (now - chrono::Duration::days(RETURNS_WINDOW_DAYS), now);

        let mut kept_ids = Vec::new();
        let mut returns_by_security = Vec::new();
        let mut latest_price = HashMap::new();

        for id in security_ids.iter().copied() {
            let bars = self.history_repo.bars(id, range).await?;
            if bars.len() < 2 {
                continue;
            }
            latest_price.insert(id.to_string(), bars.last().unwrap().close);
            let mut returns = Vec::with_capacity(bars.len() - 1);
            for window in bars.windows(2) {
                let prev = window[0].close.to_f64().unwrap_or(0.0);
                let cur = window[1].close.to_f64().unwrap_or(0.0);
                returns.push(if prev > 0.0 { (cur - prev) / prev } else { 0.0 });
            }
            kept_ids.push(id.to_string());
            returns_by_security.push(returns);
        }

        if kept_ids.is_empty() {
            return Ok((kept_ids, DMatrix::from_element(0, 0, 0.0), latest_price));
        }

        let rows = returns_by_security.iter().map(|r| r.len()).min().unwrap_or(0);
        let cols = kept_ids.len();
        let mut matrix = DMatrix::from_element(rows, cols, 0.0);
        for (col, series) in returns_by_security.iter().enumerate() {
            let tail = &series[series.len() - rows..];
            for (row, value) in tail.iter().enumerate() {
                matrix[(row, col)] = *value;
            }
        }

        Ok((kept_ids, matrix, latest_price))
    }

    /// Average pairwise return correlation for every security pair present
    /// in `returns`, consumed by `filter_correlation_aware`.
    fn correlation_matrix(ids: &[String], returns: &DMatrix<f64>) -> HashMap<(String, String), f64> {
        let columns: Vec<Vec<f64>> = (0..ids.len()).map(|col| returns.column(col).iter().copied().collect()).collect();
        let mut out = HashMap::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                out.insert((ids[i].clone(), ids[j].clone()), pearson(&columns[i], &columns[j]));
            }
        }
        out
    }

    /// Clamps each allocation group's aggregate weight to its configured
    /// ceiling (§3 allocation targets), scaling every member in an
    /// over-weight group down proportionally. The freed weight is left
    /// unallocated rather than redistributed -- it shows up as additional
    /// target cash, which is the conservative outcome when a group is
    /// already too concentrated.
    async fn apply_allocation_bounds(
        &self,
        weights: &mut HashMap<String, Decimal>,
        securities: &HashMap<String, Security>,
    ) -> Result<(), SentinelError> {
        let targets = self.allocation_repo.all().await?;
        if targets.is_empty() {
            return Ok(());
        }

        for target in &targets {
            let group_of = |id: &str| -> Option<&str> {
                securities.get(id).map(|s| match target.group_kind {
                    AllocationGroupKind::Country => s.country_group(),
                    AllocationGroupKind::Industry => s.industry_group(),
                })
            };
            let members: Vec<String> = weights
                .keys()
                .filter(|id| group_of(id) == Some(target.group_key.as_str()))
                .cloned()
                .collect();
            if members.is_empty() {
                continue;
            }
            let total: Decimal = members.iter().map(|id| weights[id]).sum();
            if total > target.max_weight && total > Decimal::ZERO {
                let factor = target.max_weight / total;
                for id in &members {
                    if let Some(w) = weights.get_mut(id) {
                        *w *= factor;
                    }
                }
            }
        }
        Ok(())
    }
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let n = len as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_a = a[..len].iter().sum::<f64>() / n;
    let mean_b = b[..len].iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..len {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom > 1e-12 {
        cov / denom
    } else {
        0.0
    }
}

#[async_trait]
impl JobHandler for PlannerBatchJob {
    async fn run(&self, ctx: JobContext, _payload: Value) -> Result<Value, SentinelError> {
        let settings = Settings::from_raw(&self.settings_repo.all().await?);
        let all_securities = self.security_repo.active().await?;
        let securities_by_id: HashMap<String, Security> =
            all_securities.iter().map(|s| (s.security_id.clone(), s.clone())).collect();

        let portfolio = self.load_portfolio().await?;
        let hash = portfolio_hash(&portfolio, &all_securities);

        let tradable_ids: Vec<&str> = portfolio.active_security_ids(&all_securities);
        let (return_ids, returns, latest_price) = self.load_returns(&tradable_ids).await?;

        if return_ids.is_empty() {
            info!(%hash, correlation_id = %ctx.correlation_id, "planner_batch: no priced securities, skipping this cycle");
            return Ok(json!({ "portfolio_hash": hash, "plan_found": false, "reason": "no_price_history" }));
        }

        let prices: HashMap<String, Decimal> = latest_price.clone();
        let current_weights: HashMap<String, f64> = portfolio
            .weights(&prices, &self.base_currency)
            .into_iter()
            .map(|(id, w)| (id, w.to_f64().unwrap_or(0.0)))
            .collect();

        let mut security_scores = HashMap::new();
        let mut fundamentals_score = HashMap::new();
        let mut opportunity_score = HashMap::new();
        for id in &return_ids {
            let fundamentals = self.market_data.get_fundamentals(id).await.ok();
            let analyst = self.market_data.get_analyst(id).await.ok();
            let quality = fundamentals
                .as_ref()
                .and_then(|f| f.quality_score)
                .and_then(|d| d.to_f64())
                .unwrap_or(0.5);
            let rating = analyst
                .as_ref()
                .and_then(|a| a.rating)
                .and_then(|d| d.to_f64())
                .unwrap_or(0.0);
            security_scores.insert(id.clone(), quality);
            fundamentals_score.insert(id.clone(), quality);
            opportunity_score.insert(id.clone(), rating.clamp(0.0, 1.0));
        }

        // Regime score: average trailing return across the priced universe,
        // scaled into [-1, 1] -- a cheap market-wide proxy consumed by the
        // optimizer's MV/HRP blend and the generator's adaptive patterns.
        let regime_score = if returns.nrows() > 0 {
            (returns.sum() / (returns.nrows() * returns.ncols()).max(1) as f64 * 20.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let optimizer_output = optimize(&OptimizerInput {
            security_ids: return_ids.clone(),
            returns: returns.clone(),
            current_weights: current_weights.clone(),
            regime_score,
            security_scores: security_scores.clone(),
            black_litterman_enabled: true,
            kelly_fraction_base: settings.kelly_fraction.to_f64().unwrap_or(0.5),
            max_cvar: settings.max_cvar.to_f64().unwrap_or(0.15),
            monte_carlo_seed: hash_to_seed(&hash),
        });

        let mut target_weights = optimizer_output.weights.clone();
        self.apply_allocation_bounds(&mut target_weights, &securities_by_id).await?;
        if optimizer_output.cvar_warning {
            warn!(%hash, cvar_95 = optimizer_output.cvar_95, "planner_batch: optimizer output exceeds the CVaR ceiling");
        }

        let signals: Vec<SecuritySignal> = return_ids
            .iter()
            .filter_map(|id| {
                let security = securities_by_id.get(id)?;
                let target = target_weights.get(id).copied().unwrap_or(Decimal::ZERO);
                let current = current_weights.get(id).copied().unwrap_or(0.0);
                let current = Decimal::from_f64_retain(current).unwrap_or(Decimal::ZERO).round_dp(6);
                let unrealized_pnl_pct = portfolio
                    .position(id)
                    .filter(|p| p.avg_cost > Decimal::ZERO)
                    .map(|p| {
                        let price = prices.get(id).copied().unwrap_or(p.avg_cost);
                        (price - p.avg_cost) / p.avg_cost
                    })
                    .unwrap_or(Decimal::ZERO);
                Some(SecuritySignal {
                    security_id: id.clone(),
                    target_weight: target,
                    current_weight: current,
                    fundamentals_score: fundamentals_score.get(id).copied().unwrap_or(0.5),
                    long_term_score: security_scores.get(id).copied().unwrap_or(0.5),
                    opportunity_score: opportunity_score.get(id).copied().unwrap_or(0.0),
                    unrealized_pnl_pct,
                    min_lot: security.min_lot,
                    allow_buy: security.allow_buy,
                    allow_sell: security.allow_sell,
                })
            })
            .collect();

        let candidates = identify_opportunities(&OpportunityIdentifierInput {
            signals,
            regime_score,
        });

        let now = Utc::now();
        let is_open = |currency: &str| {
            Venue::from_currency(currency)
                .map(|v| self.market_hours.is_open(&v, now))
                .unwrap_or(false)
        };
        let empty_last_buy_at = HashMap::new();
        let eligibility_input = EligibilityInput {
            securities: &securities_by_id,
            is_open: &is_open,
            last_buy_at: &empty_last_buy_at,
            buy_cooldown_days: settings.buy_cooldown_days,
            min_hold_days: settings.min_hold_days,
            now,
        };
        let eligible = apply_eligibility_filters(&candidates, &eligibility_input);

        let generation_ctx = GenerationContext::from_portfolio(&portfolio, prices.clone());
        let sequences = generate_sequences(&eligible, &generation_ctx, regime_score);

        let correlation = Self::correlation_matrix(&return_ids, &returns);
        let sequences = filter_correlation_aware(sequences, &correlation, settings.correlation_threshold);
        let sequences = filter_diversity_top_k(sequences, settings.diversity_top_k);

        if sequences.is_empty() {
            info!(%hash, correlation_id = %ctx.correlation_id, "planner_batch: no feasible sequence this cycle");
            return Ok(json!({ "portfolio_hash": hash, "plan_found": false, "reason": "no_sequences" }));
        }

        let security_meta: HashMap<String, SecurityMeta> = return_ids
            .iter()
            .enumerate()
            .map(|(col, id)| {
                let security = securities_by_id.get(id);
                let daily_volatility = {
                    let column = returns.column(col);
                    let mean = column.sum() / column.len().max(1) as f64;
                    let variance = column.iter().map(|r| (*r - mean).powi(2)).sum::<f64>() / column.len().max(1) as f64;
                    variance.sqrt().max(0.001)
                };
                (
                    id.clone(),
                    SecurityMeta {
                        country: security.map(|s| s.country_group().to_string()).unwrap_or_else(|| "OTHER".into()),
                        industry: security.map(|s| s.industry_group().to_string()).unwrap_or_else(|| "OTHER".into()),
                        quality_score: security_scores.get(id).copied().unwrap_or(0.5),
                        daily_volatility,
                    },
                )
            })
            .collect();

        let fee_model = FixedPercentFeeModel::new(settings.transaction_cost_fixed, settings.transaction_cost_percent);
        let equity = portfolio.total_equity(&prices, &self.base_currency);

        let evaluated = evaluate_sequences(
            sequences,
            &EvaluatorInput {
                starting_portfolio: &portfolio,
                prices: &prices,
                target_weights: &target_weights,
                security_meta: &security_meta,
                base_currency: &self.base_currency,
                scoring_weights: Default::default(),
                regime_score,
                monte_carlo_seed: hash_to_seed(&hash),
                monte_carlo_paths: MONTE_CARLO_PATHS,
                fee_model: &fee_model,
            },
        );

        let plan = match build_plan(&hash, &evaluated, equity, settings.max_cost_fraction, now) {
            Ok(plan) => plan,
            Err(_) => {
                info!(%hash, correlation_id = %ctx.correlation_id, "planner_batch: no sequence cleared the cost ceiling");
                return Ok(json!({ "portfolio_hash": hash, "plan_found": false, "reason": "no_feasible_plan" }));
            }
        };

        let plan_json = serde_json::to_string(&plan)
            .map_err(|err| SentinelError::Integrity { store: "cache".into(), reason: err.to_string() })?;
        self.recommendation_repo
            .put(&hash, &plan_json, crate::application::planning::RECOMMENDATION_TTL)
            .await?;
        self.event_bus.publish(Event::RecommendationsReady { portfolio_hash: hash.clone() });

        info!(
            %hash,
            pattern = ?plan.pattern,
            robust_score = plan.robust_score,
            correlation_id = %ctx.correlation_id,
            "planner_batch: plan cached"
        );

        Ok(json!({ "portfolio_hash": hash, "plan_found": true, "pattern": format!("{:?}", plan.pattern) }))
    }
}

/// Deterministic Monte Carlo seed derived from the portfolio hash (§8
/// determinism property): the same portfolio state always samples the same
/// paths, and a position change always samples a fresh set.
fn hash_to_seed(hash: &str) -> u64 {
    let bytes = hash.as_bytes();
    let mut seed = 0u64;
    for chunk in bytes.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        seed ^= u64::from_le_bytes(buf);
    }
    seed
}
