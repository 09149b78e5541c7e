use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CashFlowKind {
    Deposit,
    Withdrawal,
    Fee,
    Dividend,
    Coupon,
    Maturity,
}

/// Append-only ledger row (§3): deposits, withdrawals, fees, dividends,
/// coupons, maturities. Source of truth for P&L denominator and for
/// dividend-reinvestment (DRIP) scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CashFlow {
    pub id: String,
    pub kind: CashFlowKind,
    pub currency: String,
    /// Signed amount: positive for inflows (deposit, dividend, coupon,
    /// maturity), negative for outflows (withdrawal, fee).
    pub amount: Decimal,
    pub posted_at: DateTime<Utc>,
    /// Security the flow is attributable to, when applicable (dividends,
    /// coupons). `None` for account-level deposits/withdrawals.
    pub security_id: Option<String>,
}
