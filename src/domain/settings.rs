use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::errors::SentinelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Research,
}

impl FromStr for TradingMode {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(TradingMode::Live),
            "research" => Ok(TradingMode::Research),
            other => Err(SentinelError::Validation(format!(
                "unknown trading_mode {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Research => write!(f, "research"),
        }
    }
}

macro_rules! settings_keys {
    ($($const_name:ident => $key:literal),+ $(,)?) => {
        $(pub const $const_name: &str = $key;)+
    };
}

settings_keys! {
    KEY_TRADING_MODE => "trading_mode",
    KEY_BUY_COOLDOWN_DAYS => "buy_cooldown_days",
    KEY_MIN_HOLD_DAYS => "min_hold_days",
    KEY_DRIP_ENABLED => "drip_enabled",
    KEY_EMERGENCY_REBALANCING_ENABLED => "emergency_rebalancing_enabled",
    KEY_JOB_SYNC_CYCLE_MINUTES => "job_sync_cycle_minutes",
    KEY_JOB_AUTO_DEPLOY_MINUTES => "job_auto_deploy_minutes",
    KEY_TRANSACTION_COST_FIXED => "transaction_cost_fixed",
    KEY_TRANSACTION_COST_PERCENT => "transaction_cost_percent",
    KEY_MAX_CVAR => "max_cvar",
    KEY_KELLY_FRACTION => "kelly_fraction",
    KEY_REGIME_MV_HRP_BOUNDS => "regime_mv_hrp_bounds",
    KEY_DAILY_LOSS_CAP_PCT => "daily_loss_cap_pct",
    KEY_DRAWDOWN_CAP_PCT => "drawdown_cap_pct",
    KEY_PER_SYMBOL_LOSS_CAP_PCT => "per_symbol_loss_cap_pct",
    KEY_MIN_TRADE_INTERVAL_MINUTES => "min_trade_interval_minutes",
    KEY_CONSECUTIVE_LOSING_TRADES_LIMIT => "consecutive_losing_trades_limit",
    KEY_CORRELATION_THRESHOLD => "correlation_threshold",
    KEY_DIVERSITY_TOP_K => "diversity_top_k",
    KEY_MAX_COST_FRACTION => "max_cost_fraction",
    KEY_CASH_BUFFER_PCT => "cash_buffer_pct",
}

/// Typed view over the `config.settings` key/value table (§6.4). The
/// underlying store is raw strings -- `SettingsRepository::all()` -- so
/// operators can edit a row without a schema migration; this struct is the
/// hot-readable snapshot the rest of the system actually consumes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub trading_mode: TradingMode,
    pub buy_cooldown_days: i64,
    pub min_hold_days: i64,
    pub drip_enabled: bool,
    pub emergency_rebalancing_enabled: bool,
    pub job_sync_cycle_minutes: i64,
    pub job_auto_deploy_minutes: i64,
    pub transaction_cost_fixed: Decimal,
    pub transaction_cost_percent: Decimal,
    pub max_cvar: Decimal,
    pub kelly_fraction: Decimal,
    pub regime_mv_hrp_bounds: (Decimal, Decimal),
    pub daily_loss_cap_pct: f64,
    pub drawdown_cap_pct: f64,
    pub per_symbol_loss_cap_pct: f64,
    pub min_trade_interval_minutes: i64,
    pub consecutive_losing_trades_limit: u32,
    pub correlation_threshold: f64,
    pub diversity_top_k: usize,
    pub max_cost_fraction: Decimal,
    pub cash_buffer_pct: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Research,
            buy_cooldown_days: 30,
            min_hold_days: 90,
            drip_enabled: true,
            emergency_rebalancing_enabled: false,
            job_sync_cycle_minutes: 5,
            job_auto_deploy_minutes: 15,
            transaction_cost_fixed: Decimal::new(0, 0),
            transaction_cost_percent: Decimal::new(5, 4),
            max_cvar: Decimal::new(15, 2),
            kelly_fraction: Decimal::new(5, 1),
            regime_mv_hrp_bounds: (Decimal::new(30, 2), Decimal::new(70, 2)),
            daily_loss_cap_pct: 5.0,
            drawdown_cap_pct: 20.0,
            per_symbol_loss_cap_pct: 15.0,
            min_trade_interval_minutes: 30,
            consecutive_losing_trades_limit: 5,
            correlation_threshold: 0.8,
            diversity_top_k: 3,
            max_cost_fraction: Decimal::new(5, 2),
            cash_buffer_pct: Decimal::new(2, 2),
        }
    }
}

impl Settings {
    /// Builds a typed snapshot from the raw key/value rows, falling back to
    /// defaults for any key that is absent or malformed rather than
    /// refusing to start -- a single bad row must not take the daemon down.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let defaults = Settings::default();
        Self {
            trading_mode: raw
                .get(KEY_TRADING_MODE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trading_mode),
            buy_cooldown_days: parse_or(raw, KEY_BUY_COOLDOWN_DAYS, defaults.buy_cooldown_days),
            min_hold_days: parse_or(raw, KEY_MIN_HOLD_DAYS, defaults.min_hold_days),
            drip_enabled: parse_or(raw, KEY_DRIP_ENABLED, defaults.drip_enabled),
            emergency_rebalancing_enabled: parse_or(
                raw,
                KEY_EMERGENCY_REBALANCING_ENABLED,
                defaults.emergency_rebalancing_enabled,
            ),
            job_sync_cycle_minutes: parse_or(
                raw,
                KEY_JOB_SYNC_CYCLE_MINUTES,
                defaults.job_sync_cycle_minutes,
            ),
            job_auto_deploy_minutes: parse_or(
                raw,
                KEY_JOB_AUTO_DEPLOY_MINUTES,
                defaults.job_auto_deploy_minutes,
            ),
            transaction_cost_fixed: parse_or(
                raw,
                KEY_TRANSACTION_COST_FIXED,
                defaults.transaction_cost_fixed,
            ),
            transaction_cost_percent: parse_or(
                raw,
                KEY_TRANSACTION_COST_PERCENT,
                defaults.transaction_cost_percent,
            ),
            max_cvar: parse_or(raw, KEY_MAX_CVAR, defaults.max_cvar),
            kelly_fraction: parse_or(raw, KEY_KELLY_FRACTION, defaults.kelly_fraction),
            regime_mv_hrp_bounds: raw
                .get(KEY_REGIME_MV_HRP_BOUNDS)
                .and_then(|v| parse_bounds(v))
                .unwrap_or(defaults.regime_mv_hrp_bounds),
            daily_loss_cap_pct: parse_or(raw, KEY_DAILY_LOSS_CAP_PCT, defaults.daily_loss_cap_pct),
            drawdown_cap_pct: parse_or(raw, KEY_DRAWDOWN_CAP_PCT, defaults.drawdown_cap_pct),
            per_symbol_loss_cap_pct: parse_or(
                raw,
                KEY_PER_SYMBOL_LOSS_CAP_PCT,
                defaults.per_symbol_loss_cap_pct,
            ),
            min_trade_interval_minutes: parse_or(
                raw,
                KEY_MIN_TRADE_INTERVAL_MINUTES,
                defaults.min_trade_interval_minutes,
            ),
            consecutive_losing_trades_limit: parse_or(
                raw,
                KEY_CONSECUTIVE_LOSING_TRADES_LIMIT,
                defaults.consecutive_losing_trades_limit,
            ),
            correlation_threshold: parse_or(raw, KEY_CORRELATION_THRESHOLD, defaults.correlation_threshold),
            diversity_top_k: parse_or(raw, KEY_DIVERSITY_TOP_K, defaults.diversity_top_k),
            max_cost_fraction: parse_or(raw, KEY_MAX_COST_FRACTION, defaults.max_cost_fraction),
            cash_buffer_pct: parse_or(raw, KEY_CASH_BUFFER_PCT, defaults.cash_buffer_pct),
        }
    }
}

fn parse_or<T: FromStr>(raw: &HashMap<String, String>, key: &str, default: T) -> T {
    raw.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bounds(raw: &str) -> Option<(Decimal, Decimal)> {
    let (lo, hi) = raw.split_once(',')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let raw = HashMap::new();
        let settings = Settings::from_raw(&raw);
        assert_eq!(settings.trading_mode, TradingMode::Research);
        assert_eq!(settings.min_hold_days, 90);
    }

    #[test]
    fn parses_bounds_pair() {
        let mut raw = HashMap::new();
        raw.insert(KEY_REGIME_MV_HRP_BOUNDS.to_string(), "0.25,0.80".to_string());
        let settings = Settings::from_raw(&raw);
        assert_eq!(
            settings.regime_mv_hrp_bounds,
            (Decimal::new(25, 2), Decimal::new(80, 2))
        );
    }

    #[test]
    fn malformed_value_falls_back() {
        let mut raw = HashMap::new();
        raw.insert(KEY_TRADING_MODE.to_string(), "bogus".to_string());
        let settings = Settings::from_raw(&raw);
        assert_eq!(settings.trading_mode, TradingMode::Research);
    }
}
