//! Pure `CHECK_GUARDS` evaluation (§4.5 guards a-f), factored out of the
//! trading loop's state machine so each rule is unit-testable without a
//! database, broker, or clock.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::GuardViolation;
use crate::domain::risk::CircuitBreakerState;
use crate::domain::settings::{Settings, TradingMode};
use crate::domain::trading::OrderSide;

pub struct GuardCheck<'a> {
    pub settings: &'a Settings,
    pub circuit: &'a CircuitBreakerState,
    pub daily_loss_pct: f64,
    pub daily_loss_cap_pct: f64,
    pub drawdown_pct: f64,
    pub drawdown_cap_pct: f64,
    pub per_symbol_loss: Option<(String, f64, f64)>,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub min_trade_interval: Duration,
    pub last_buy_at_for_symbol: Option<DateTime<Utc>>,
    pub step_symbol: &'a str,
    pub step_side: OrderSide,
    pub venue_open: bool,
    pub venue_flexible_buy_hours: bool,
    pub venue_name: &'a str,
    pub cash_available: Decimal,
    pub cash_needed: Decimal,
    pub cash_currency: &'a str,
    pub now: DateTime<Utc>,
}

/// Evaluates the full ordered guard list for the plan's current step,
/// returning the first violation encountered. An `Ok` result means the
/// `EXECUTE` transition may proceed (§4.5).
pub fn check_guards(check: &GuardCheck) -> Result<(), GuardViolation> {
    if check.daily_loss_pct >= check.daily_loss_cap_pct {
        return Err(GuardViolation::DailyLossCap {
            loss_pct: check.daily_loss_pct,
            cap_pct: check.daily_loss_cap_pct,
        });
    }
    if check.drawdown_pct >= check.drawdown_cap_pct {
        return Err(GuardViolation::DrawdownCap {
            drawdown_pct: check.drawdown_pct,
            cap_pct: check.drawdown_cap_pct,
        });
    }
    if let Some((symbol, loss_pct, cap_pct)) = &check.per_symbol_loss {
        if *loss_pct >= *cap_pct {
            return Err(GuardViolation::PerSymbolLossCap {
                symbol: symbol.clone(),
                loss_pct: *loss_pct,
                cap_pct: *cap_pct,
            });
        }
    }

    let halt_level = check.circuit.effective_level();
    if halt_level.blocks_all_orders() {
        return Err(GuardViolation::CircuitOpen {
            reason: format!("{halt_level:?}"),
        });
    }
    if halt_level.blocks_buys() && check.step_side == OrderSide::Buy {
        return Err(GuardViolation::CircuitOpen {
            reason: format!("{halt_level:?}: buys blocked"),
        });
    }

    if let Some(last) = check.last_trade_at {
        let elapsed = check.now.signed_duration_since(last);
        if elapsed < check.min_trade_interval {
            return Err(GuardViolation::TradeFrequency {
                elapsed_secs: elapsed.num_seconds().max(0),
                min_secs: check.min_trade_interval.num_seconds(),
            });
        }
    }

    if let Some(last_buy) = check.last_buy_at_for_symbol {
        let since = check.now.signed_duration_since(last_buy);
        match check.step_side {
            OrderSide::Sell => {
                let min_hold = Duration::days(check.settings.min_hold_days);
                if since < min_hold {
                    return Err(GuardViolation::MinHold {
                        symbol: check.step_symbol.to_string(),
                        held_days: since.num_days(),
                        min_days: check.settings.min_hold_days,
                    });
                }
            }
            OrderSide::Buy => {
                let cooldown = Duration::days(check.settings.buy_cooldown_days);
                if since < cooldown {
                    return Err(GuardViolation::BuyCooldown {
                        symbol: check.step_symbol.to_string(),
                        remaining_days: (cooldown - since).num_days().max(0),
                    });
                }
            }
        }
    }

    if check.settings.trading_mode == TradingMode::Research {
        return Err(GuardViolation::ResearchMode);
    }

    let needs_open = match check.step_side {
        OrderSide::Sell => true,
        OrderSide::Buy => !check.venue_flexible_buy_hours,
    };
    if needs_open && !check.venue_open {
        return Err(GuardViolation::MarketClosed {
            venue: check.venue_name.to_string(),
        });
    }

    if check.step_side == OrderSide::Buy && check.cash_available < check.cash_needed {
        return Err(GuardViolation::InsufficientCash {
            need: check.cash_needed,
            available: check.cash_available,
            currency: check.cash_currency.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_check() -> (Settings, CircuitBreakerState) {
        let mut settings = Settings::default();
        settings.trading_mode = TradingMode::Live;
        (settings, CircuitBreakerState::new(5, dec!(1000)))
    }

    fn check<'a>(settings: &'a Settings, circuit: &'a CircuitBreakerState) -> GuardCheck<'a> {
        GuardCheck {
            settings,
            circuit,
            daily_loss_pct: 0.0,
            daily_loss_cap_pct: 5.0,
            drawdown_pct: 0.0,
            drawdown_cap_pct: 20.0,
            per_symbol_loss: None,
            last_trade_at: None,
            min_trade_interval: Duration::minutes(30),
            last_buy_at_for_symbol: None,
            step_symbol: "AAPL",
            step_side: OrderSide::Buy,
            venue_open: true,
            venue_flexible_buy_hours: true,
            venue_name: "NYSE",
            cash_available: dec!(10000),
            cash_needed: dec!(1500),
            cash_currency: "USD",
            now: Utc::now(),
        }
    }

    #[test]
    fn passes_when_everything_is_clean() {
        let (settings, circuit) = base_check();
        assert!(check_guards(&check(&settings, &circuit)).is_ok());
    }

    #[test]
    fn research_mode_blocks_execution() {
        let (mut settings, circuit) = base_check();
        settings.trading_mode = TradingMode::Research;
        assert_eq!(
            check_guards(&check(&settings, &circuit)),
            Err(GuardViolation::ResearchMode)
        );
    }

    #[test]
    fn trade_frequency_guard_blocks_rapid_succession() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.last_trade_at = Some(c.now - Duration::minutes(5));
        assert!(matches!(check_guards(&c), Err(GuardViolation::TradeFrequency { .. })));
    }

    #[test]
    fn buy_cooldown_blocks_recent_rebuy() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.last_buy_at_for_symbol = Some(c.now - Duration::days(5));
        assert!(matches!(check_guards(&c), Err(GuardViolation::BuyCooldown { .. })));
    }

    #[test]
    fn min_hold_blocks_early_sell() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.step_side = OrderSide::Sell;
        c.last_buy_at_for_symbol = Some(c.now - Duration::days(10));
        assert!(matches!(check_guards(&c), Err(GuardViolation::MinHold { .. })));
    }

    #[test]
    fn strict_venue_closed_blocks_buy() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.venue_flexible_buy_hours = false;
        c.venue_open = false;
        assert!(matches!(check_guards(&c), Err(GuardViolation::MarketClosed { .. })));
    }

    #[test]
    fn flexible_venue_buy_allowed_while_closed() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.venue_flexible_buy_hours = true;
        c.venue_open = false;
        assert!(check_guards(&c).is_ok());
    }

    #[test]
    fn sell_always_requires_venue_open() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.step_side = OrderSide::Sell;
        c.venue_open = false;
        assert!(matches!(check_guards(&c), Err(GuardViolation::MarketClosed { .. })));
    }

    #[test]
    fn insufficient_cash_blocks_buy() {
        let (settings, circuit) = base_check();
        let mut c = check(&settings, &circuit);
        c.cash_available = dec!(100);
        assert!(matches!(check_guards(&c), Err(GuardViolation::InsufficientCash { .. })));
    }

    #[test]
    fn full_halt_blocks_even_sells() {
        let (settings, mut circuit) = base_check();
        circuit.ledger_health_check_failed = true;
        let mut c = check(&settings, &circuit);
        c.step_side = OrderSide::Sell;
        c.venue_open = true;
        assert!(matches!(check_guards(&c), Err(GuardViolation::CircuitOpen { .. })));
    }

    #[test]
    fn reduced_halt_blocks_buys_but_not_sells() {
        let (settings, mut circuit) = base_check();
        circuit.consecutive_losing_trades = 4;
        circuit.consecutive_losing_trades_limit = 5;
        let mut buy = check(&settings, &circuit);
        assert!(matches!(check_guards(&buy), Err(GuardViolation::CircuitOpen { .. })));
        buy.step_side = OrderSide::Sell;
        assert!(check_guards(&buy).is_ok());
    }
}
