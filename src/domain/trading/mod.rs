//! Core trading domain entities and value objects.

pub mod cash_flow;
pub mod fee_model;
pub mod hash;
pub mod portfolio;
pub mod position;
pub mod trade;

pub use cash_flow::{CashFlow, CashFlowKind};
pub use fee_model::{FeeModel, FixedPercentFeeModel, TradeCost};
pub use portfolio::Portfolio;
pub use position::Position;
pub use trade::{OrderSide, Trade};
