//! Wires repositories, clients, and workers into one running process (§2).
//!
//! Grounded on the reference architecture's `application/system/mod.rs::
//! Application::build`: one `Arc`-held container constructed once at
//! startup, owning every long-lived task's shared dependencies, built
//! explicitly here rather than assembled through a DI framework (§9 design
//! note "explicit container instead of DI magic").

use std::sync::Arc;

use chrono::NaiveTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::jobs;
use crate::application::queue::{JobRegistry, JobHandler, QueueManager, WorkerPool};
use crate::application::scheduler::{MarketHoursOracle, TimeScheduler};
use crate::application::trading::TradingLoop;
use crate::config::{ClientMode, Config};
use crate::domain::market::{Venue, VenueRules};
use crate::domain::ports::{BrokerClient, MarketDataClient};
use crate::domain::repositories::{
    AllocationTargetRepository, ClientDataCacheRepository, HistoryRepository, JobInstanceRepository,
    LedgerRepository, PortfolioRepository, RecommendationRepository, SecurityRepository, SettingsRepository,
};
use crate::domain::risk::CircuitBreakerState;
use crate::domain::scheduling::{Cadence, JobSpec, MarketGate, Priority};
use crate::domain::settings::Settings;
use crate::infrastructure::broker::MockBrokerClient;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::market_data::MockMarketDataClient;
use crate::infrastructure::persistence::database::{Database, Durability};
use crate::infrastructure::persistence::repositories::{
    SqliteAllocationTargetRepository, SqliteClientDataCacheRepository, SqliteHistoryRepository,
    SqliteJobInstanceRepository, SqliteLedgerRepository, SqlitePortfolioRepository,
    SqliteRecommendationRepository, SqliteSecurityRepository, SqliteSettingsRepository,
};
use crate::infrastructure::rate_limiter::RateLimiters;

/// Every long-lived service the running process needs, built once in
/// `Application::build` and handed out as clones of the `Arc`s already held
/// here to whichever long-lived task needs them.
pub struct Application {
    pub config: Config,
    pub event_bus: Arc<EventBus>,
    pub queue: Arc<QueueManager>,
    pub registry: Arc<JobRegistry>,
    pub worker_pool: Arc<WorkerPool>,
    pub scheduler: Arc<TimeScheduler>,
    pub trading_loop: Arc<TradingLoop>,
    pub market_hours: Arc<MarketHoursOracle>,
    pub rate_limiters: Arc<RateLimiters>,

    pub security_repo: Arc<dyn SecurityRepository>,
    pub settings_repo: Arc<dyn SettingsRepository>,
    pub allocation_repo: Arc<dyn AllocationTargetRepository>,
    pub ledger_repo: Arc<dyn LedgerRepository>,
    pub portfolio_repo: Arc<dyn PortfolioRepository>,
    pub history_repo: Arc<dyn HistoryRepository>,
    pub recommendation_repo: Arc<dyn RecommendationRepository>,
    pub job_instance_repo: Arc<dyn JobInstanceRepository>,
    pub client_data_repo: Arc<dyn ClientDataCacheRepository>,

    pub broker: Arc<dyn BrokerClient>,
    pub market_data: Arc<dyn MarketDataClient>,

    pub shutdown: CancellationToken,
}

/// The nine venues the market-hours oracle reasons about (§4.2), with their
/// IANA timezone, regular session, and premarket open. Holiday calendars
/// start empty; a future `universe_sync` refresh is the seam for loading
/// them, not this constructor.
fn default_venue_rules() -> Vec<VenueRules> {
    let time = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("valid time literal");
    vec![
        VenueRules {
            venue: Venue::Nyse,
            timezone: chrono_tz::America::New_York,
            open: time(9, 30),
            close: time(16, 0),
            premarket_open: time(4, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Nasdaq,
            timezone: chrono_tz::America::New_York,
            open: time(9, 30),
            close: time(16, 0),
            premarket_open: time(4, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Xetra,
            timezone: chrono_tz::Europe::Berlin,
            open: time(9, 0),
            close: time(17, 30),
            premarket_open: time(8, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Lse,
            timezone: chrono_tz::Europe::London,
            open: time(8, 0),
            close: time(16, 30),
            premarket_open: time(7, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Euronext,
            timezone: chrono_tz::Europe::Paris,
            open: time(9, 0),
            close: time(17, 30),
            premarket_open: time(8, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Hkex,
            timezone: chrono_tz::Asia::Hong_Kong,
            open: time(9, 30),
            close: time(16, 0),
            premarket_open: time(9, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Sse,
            timezone: chrono_tz::Asia::Shanghai,
            open: time(9, 30),
            close: time(15, 0),
            premarket_open: time(9, 15),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Tsx,
            timezone: chrono_tz::America::Toronto,
            open: time(9, 30),
            close: time(16, 0),
            premarket_open: time(7, 0),
            holidays: vec![],
        },
        VenueRules {
            venue: Venue::Asx,
            timezone: chrono_tz::Australia::Sydney,
            open: time(10, 0),
            close: time(16, 0),
            premarket_open: time(7, 0),
            holidays: vec![],
        },
    ]
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| anyhow::anyhow!("creating data dir {}: {e}", config.data_dir.display()))?;

        let universe_db = Database::open(&config.data_dir.join("universe.sqlite3"), Durability::Normal).await?;
        let config_db = Database::open(&config.data_dir.join("config.sqlite3"), Durability::Normal).await?;
        let ledger_db = Database::open(&config.data_dir.join("ledger.sqlite3"), Durability::Full).await?;
        let portfolio_db = Database::open(&config.data_dir.join("portfolio.sqlite3"), Durability::Normal).await?;
        let history_db = Database::open(&config.data_dir.join("history.sqlite3"), Durability::Normal).await?;
        let cache_db = Database::open(&config.data_dir.join("cache.sqlite3"), Durability::Off).await?;
        let client_data_db =
            Database::open(&config.data_dir.join("client_data.sqlite3"), Durability::Off).await?;

        let security_repo: Arc<dyn SecurityRepository> =
            Arc::new(SqliteSecurityRepository::new(universe_db.clone()).await?);
        let allocation_repo: Arc<dyn AllocationTargetRepository> =
            Arc::new(SqliteAllocationTargetRepository::new(universe_db).await?);
        let settings_repo: Arc<dyn SettingsRepository> =
            Arc::new(SqliteSettingsRepository::new(config_db).await?);
        let ledger_repo: Arc<dyn LedgerRepository> = Arc::new(SqliteLedgerRepository::new(ledger_db).await?);
        let portfolio_repo: Arc<dyn PortfolioRepository> =
            Arc::new(SqlitePortfolioRepository::new(portfolio_db).await?);
        let history_repo: Arc<dyn HistoryRepository> =
            Arc::new(SqliteHistoryRepository::new(history_db).await?);
        let recommendation_repo: Arc<dyn RecommendationRepository> =
            Arc::new(SqliteRecommendationRepository::new(cache_db.clone()).await?);
        let job_instance_repo: Arc<dyn JobInstanceRepository> =
            Arc::new(SqliteJobInstanceRepository::new(cache_db).await?);
        let client_data_repo: Arc<dyn ClientDataCacheRepository> =
            Arc::new(SqliteClientDataCacheRepository::new(client_data_db).await?);

        let shutdown = CancellationToken::new();
        let event_bus = Arc::new(EventBus::new());
        let rate_limiters = Arc::new(RateLimiters::new(shutdown.clone()));
        let market_hours = Arc::new(MarketHoursOracle::new(default_venue_rules()));

        let (broker, market_data): (Arc<dyn BrokerClient>, Arc<dyn MarketDataClient>) = match config.client_mode {
            ClientMode::Mock => (
                Arc::new(MockBrokerClient::new(config.mock_starting_cash, &config.base_currency)),
                Arc::new(MockMarketDataClient::new()),
            ),
        };

        let queue = Arc::new(QueueManager::new(job_instance_repo.clone()));

        // `CircuitBreakerState::daily_loss_limit` is an absolute currency
        // figure, not the `daily_loss_cap_pct` setting itself (that
        // percentage is checked directly against live equity in
        // `check_guards`); the limit here only drives the trigger's own
        // `HaltLevel` staging, so it is seeded off the starting cash until
        // the first `daily_reconciliation` run re-derives it from equity.
        let settings = Settings::from_raw(&settings_repo.all().await?);
        let daily_loss_pct_fraction =
            rust_decimal::Decimal::from_f64_retain(settings.daily_loss_cap_pct / 100.0).unwrap_or_default();
        let circuit = CircuitBreakerState::new(
            settings.consecutive_losing_trades_limit,
            config.mock_starting_cash * daily_loss_pct_fraction,
        );

        let trading_loop = Arc::new(TradingLoop::new(
            ledger_repo.clone(),
            portfolio_repo.clone(),
            security_repo.clone(),
            settings_repo.clone(),
            recommendation_repo.clone(),
            broker.clone(),
            event_bus.clone(),
            queue.clone(),
            market_hours.clone(),
            config.base_currency.clone(),
            circuit,
        ));

        let registry = Arc::new(build_registry(RegistryDeps {
            security_repo: security_repo.clone(),
            settings_repo: settings_repo.clone(),
            allocation_repo: allocation_repo.clone(),
            ledger_repo: ledger_repo.clone(),
            portfolio_repo: portfolio_repo.clone(),
            history_repo: history_repo.clone(),
            recommendation_repo: recommendation_repo.clone(),
            job_instance_repo: job_instance_repo.clone(),
            client_data_repo: client_data_repo.clone(),
            broker: broker.clone(),
            market_data: market_data.clone(),
            event_bus: event_bus.clone(),
            queue: queue.clone(),
            market_hours: market_hours.clone(),
            trading_loop: trading_loop.clone(),
            base_currency: config.base_currency.clone(),
            data_dir: config.data_dir.clone(),
            backup_root: config.data_dir.join("backups"),
        }));

        let worker_pool = Arc::new(WorkerPool::new(
            queue.clone(),
            registry.clone(),
            event_bus.clone(),
            shutdown.clone(),
        ));
        let scheduler = Arc::new(TimeScheduler::new(registry.clone(), queue.clone(), market_hours.clone()));

        Ok(Self {
            config,
            event_bus,
            queue,
            registry,
            worker_pool,
            scheduler,
            trading_loop,
            market_hours,
            rate_limiters,
            security_repo,
            settings_repo,
            allocation_repo,
            ledger_repo,
            portfolio_repo,
            history_repo,
            recommendation_repo,
            job_instance_repo,
            client_data_repo,
            broker,
            market_data,
            shutdown,
        })
    }

    /// Spawns every long-lived task against this container's shared
    /// `CancellationToken` and returns their handles so the caller (`main`)
    /// can await them during graceful shutdown.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.worker_pool.clone().spawn();
        handles.push(self.scheduler.clone().spawn(self.shutdown.clone()));

        let trading_loop = self.trading_loop.clone();
        let trading_shutdown = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            trading_loop.run(trading_shutdown).await;
        }));

        info!(workers = handles.len(), "application tasks spawned");
        handles
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

struct RegistryDeps {
    security_repo: Arc<dyn SecurityRepository>,
    settings_repo: Arc<dyn SettingsRepository>,
    allocation_repo: Arc<dyn AllocationTargetRepository>,
    ledger_repo: Arc<dyn LedgerRepository>,
    portfolio_repo: Arc<dyn PortfolioRepository>,
    history_repo: Arc<dyn HistoryRepository>,
    recommendation_repo: Arc<dyn RecommendationRepository>,
    job_instance_repo: Arc<dyn JobInstanceRepository>,
    client_data_repo: Arc<dyn ClientDataCacheRepository>,
    broker: Arc<dyn BrokerClient>,
    market_data: Arc<dyn MarketDataClient>,
    event_bus: Arc<EventBus>,
    queue: Arc<QueueManager>,
    market_hours: Arc<MarketHoursOracle>,
    trading_loop: Arc<TradingLoop>,
    base_currency: String,
    data_dir: std::path::PathBuf,
    backup_root: std::path::PathBuf,
}

/// Registers one `JobSpec` row plus its handler per named job (§4.1, §4.4,
/// §4.6, §6.5). Adding a job means adding a row here, not touching the
/// worker pool or scheduler control flow (§9 design note).
fn build_registry(deps: RegistryDeps) -> JobRegistry {
    let mut registry = JobRegistry::new();

    let sync_cycle: Arc<dyn JobHandler> = Arc::new(jobs::sync_cycle::SyncCycleJob::new(
        deps.broker.clone(),
        deps.portfolio_repo.clone(),
        deps.ledger_repo.clone(),
        deps.event_bus.clone(),
        deps.queue.clone(),
        deps.base_currency.clone(),
    ));
    registry.register(
        JobSpec::scheduled(
            "sync_cycle",
            Cadence::Every5m,
            MarketGate::MarketOpenAny,
            Priority::Normal,
        ),
        sync_cycle,
    );

    let universe_sync: Arc<dyn JobHandler> =
        Arc::new(jobs::universe_sync::UniverseSyncJob::new(deps.security_repo.clone()));
    registry.register(
        JobSpec::scheduled("universe_sync", Cadence::DailyAt { hour: 3, minute: 0 }, MarketGate::Always, Priority::Background),
        universe_sync,
    );

    let price_sync: Arc<dyn JobHandler> = Arc::new(jobs::price_sync::PriceSyncJob::new(
        deps.security_repo.clone(),
        deps.market_data.clone(),
        deps.history_repo.clone(),
    ));
    registry.register(
        JobSpec::scheduled("price_sync", Cadence::Every10m, MarketGate::MarketOpenAny, Priority::Normal),
        price_sync,
    );

    let planner_batch: Arc<dyn JobHandler> = Arc::new(jobs::planner_batch::PlannerBatchJob::new(
        deps.security_repo.clone(),
        deps.settings_repo.clone(),
        deps.allocation_repo.clone(),
        deps.portfolio_repo.clone(),
        deps.history_repo.clone(),
        deps.recommendation_repo.clone(),
        deps.market_data.clone(),
        deps.market_hours.clone(),
        deps.event_bus.clone(),
        deps.base_currency.clone(),
    ));
    registry.register(
        JobSpec::scheduled("planner_batch", Cadence::Every30m, MarketGate::MarketOpenAny, Priority::Normal)
            .with_timeout(std::time::Duration::from_secs(180)),
        planner_batch,
    );

    let reconciliation: Arc<dyn JobHandler> =
        Arc::new(jobs::daily_reconciliation::DailyReconciliationJob::new(deps.trading_loop.clone()));
    registry.register(
        JobSpec::scheduled(
            "daily_reconciliation",
            Cadence::DailyAt { hour: 4, minute: 0 },
            MarketGate::Always,
            Priority::Critical,
        ),
        reconciliation,
    );

    let health_check: Arc<dyn JobHandler> =
        Arc::new(jobs::health_check::HealthCheckJob::new(deps.trading_loop.clone()));
    registry.register(
        JobSpec::scheduled("health_check", Cadence::Every5m, MarketGate::Always, Priority::Critical),
        health_check,
    );

    let recommendation_gc: Arc<dyn JobHandler> =
        Arc::new(jobs::recommendation_gc::RecommendationGcJob::new(deps.recommendation_repo.clone()));
    registry.register(
        JobSpec::scheduled("recommendation_gc", Cadence::Hourly, MarketGate::Always, Priority::Background),
        recommendation_gc,
    );

    let job_history_prune: Arc<dyn JobHandler> =
        Arc::new(jobs::job_history_prune::JobHistoryPruneJob::new(deps.job_instance_repo.clone()));
    registry.register(
        JobSpec::scheduled(
            "job_history_prune",
            Cadence::DailyAt { hour: 3, minute: 30 },
            MarketGate::Always,
            Priority::Background,
        ),
        job_history_prune,
    );

    // Four tiers per §6.5, one `JobSpec` row each since a spec carries a
    // single cadence; each owns its own subdirectory and retention count
    // under `backup_root`, default counts 24/7/4/12.
    let backup_hourly: Arc<dyn JobHandler> = Arc::new(jobs::backup_snapshot::BackupSnapshotJob::new(
        deps.data_dir.clone(),
        deps.backup_root.clone(),
        "hourly",
        24,
    ));
    registry.register(
        JobSpec::scheduled("backup_snapshot_hourly", Cadence::Hourly, MarketGate::Always, Priority::Background),
        backup_hourly,
    );

    let backup_daily: Arc<dyn JobHandler> = Arc::new(jobs::backup_snapshot::BackupSnapshotJob::new(
        deps.data_dir.clone(),
        deps.backup_root.clone(),
        "daily",
        7,
    ));
    registry.register(
        JobSpec::scheduled(
            "backup_snapshot_daily",
            Cadence::DailyAt { hour: 2, minute: 0 },
            MarketGate::Always,
            Priority::Background,
        ),
        backup_daily,
    );

    let backup_weekly: Arc<dyn JobHandler> = Arc::new(jobs::backup_snapshot::BackupSnapshotJob::new(
        deps.data_dir.clone(),
        deps.backup_root.clone(),
        "weekly",
        4,
    ));
    registry.register(
        JobSpec::scheduled(
            "backup_snapshot_weekly",
            Cadence::WeeklyAt { weekday: chrono::Weekday::Sun, hour: 2, minute: 30 },
            MarketGate::Always,
            Priority::Background,
        ),
        backup_weekly,
    );

    let backup_monthly: Arc<dyn JobHandler> = Arc::new(jobs::backup_snapshot::BackupSnapshotJob::new(
        deps.data_dir.clone(),
        deps.backup_root.clone(),
        "monthly",
        12,
    ));
    registry.register(
        JobSpec::scheduled(
            "backup_snapshot_monthly",
            Cadence::MonthlyAt { day: 1, hour: 3, minute: 0 },
            MarketGate::Always,
            Priority::Background,
        ),
        backup_monthly,
    );

    registry
}
