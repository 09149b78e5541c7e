//! sqlx-backed repository implementations, one module per store table (§3, §6.1).

pub mod allocation_target;
pub mod client_data_cache;
pub mod history;
pub mod job_instance;
pub mod ledger;
pub mod portfolio;
pub mod recommendation;
pub mod security;
pub mod settings;

pub use allocation_target::SqliteAllocationTargetRepository;
pub use client_data_cache::SqliteClientDataCacheRepository;
pub use history::SqliteHistoryRepository;
pub use job_instance::SqliteJobInstanceRepository;
pub use ledger::SqliteLedgerRepository;
pub use portfolio::SqlitePortfolioRepository;
pub use recommendation::SqliteRecommendationRepository;
pub use security::SqliteSecurityRepository;
pub use settings::SqliteSettingsRepository;
