//! Market-aware cron-like scheduling (§4.2).

pub mod market_hours;
pub mod time_scheduler;

pub use market_hours::MarketHoursOracle;
pub use time_scheduler::TimeScheduler;
