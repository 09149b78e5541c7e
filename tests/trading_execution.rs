//! End-to-end coverage of the manual execution path (§6.2, §4.5): the HTTP
//! layer's `execute_plan_now` must enforce the same guardrails the
//! autonomous loop does, never skip `CHECK_GUARDS`, and refuse outright in
//! research mode.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use sentinel::application::queue::QueueManager;
use sentinel::application::scheduler::MarketHoursOracle;
use sentinel::application::trading::TradingLoop;
use sentinel::domain::errors::SentinelError;
use sentinel::domain::market::{Venue, VenueRules};
use sentinel::domain::planning::plan::{Plan, PlanStep};
use sentinel::domain::planning::sequence::{ActionStep, SequencePattern};
use sentinel::domain::repositories::{
    JobInstanceRepository, LedgerRepository, PortfolioRepository, RecommendationRepository, SecurityRepository,
    SettingsRepository,
};
use sentinel::domain::risk::CircuitBreakerState;
use sentinel::domain::securities::Security;
use sentinel::domain::trading::OrderSide;
use sentinel::infrastructure::broker::MockBrokerClient;
use sentinel::infrastructure::event_bus::EventBus;
use sentinel::infrastructure::persistence::database::{Database, Durability};
use sentinel::infrastructure::persistence::repositories::{
    SqliteJobInstanceRepository, SqliteLedgerRepository, SqlitePortfolioRepository, SqliteRecommendationRepository,
    SqliteSecurityRepository, SqliteSettingsRepository,
};

struct Harness {
    trading_loop: Arc<TradingLoop>,
    settings_repo: Arc<dyn SettingsRepository>,
    recommendation_repo: Arc<dyn RecommendationRepository>,
    _data_dir: PathBuf,
}

async fn build_harness() -> Harness {
    let data_dir = std::env::temp_dir().join(format!("sentinel-test-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&data_dir).await.unwrap();

    let universe_db = Database::open(&data_dir.join("universe.sqlite3"), Durability::Normal).await.unwrap();
    let config_db = Database::open(&data_dir.join("config.sqlite3"), Durability::Normal).await.unwrap();
    let ledger_db = Database::open(&data_dir.join("ledger.sqlite3"), Durability::Full).await.unwrap();
    let portfolio_db = Database::open(&data_dir.join("portfolio.sqlite3"), Durability::Normal).await.unwrap();
    let cache_db = Database::open(&data_dir.join("cache.sqlite3"), Durability::Off).await.unwrap();

    let security_repo: Arc<dyn SecurityRepository> =
        Arc::new(SqliteSecurityRepository::new(universe_db).await.unwrap());
    let settings_repo: Arc<dyn SettingsRepository> =
        Arc::new(SqliteSettingsRepository::new(config_db).await.unwrap());
    let ledger_repo: Arc<dyn LedgerRepository> = Arc::new(SqliteLedgerRepository::new(ledger_db).await.unwrap());
    let portfolio_repo: Arc<dyn PortfolioRepository> =
        Arc::new(SqlitePortfolioRepository::new(portfolio_db).await.unwrap());
    let recommendation_repo: Arc<dyn RecommendationRepository> =
        Arc::new(SqliteRecommendationRepository::new(cache_db.clone()).await.unwrap());
    let job_instance_repo: Arc<dyn JobInstanceRepository> =
        Arc::new(SqliteJobInstanceRepository::new(cache_db).await.unwrap());

    security_repo
        .upsert(&Security {
            security_id: "sec-aapl".into(),
            symbol: "AAPL".into(),
            isin: Some("US0378331005".into()),
            currency: "USD".into(),
            country: Some("US".into()),
            industry: Some("Technology".into()),
            min_lot: dec!(1),
            allow_buy: true,
            allow_sell: true,
            active: true,
        })
        .await
        .unwrap();

    settings_repo.set("trading_mode", "live").await.unwrap();

    let broker = Arc::new(MockBrokerClient::new(dec!(100_000), "USD"));
    broker.set_price("sec-aapl", dec!(150)).await;

    let event_bus = Arc::new(EventBus::new());
    let queue = Arc::new(QueueManager::new(job_instance_repo.clone()));
    let market_hours = Arc::new(MarketHoursOracle::new(vec![VenueRules {
        venue: Venue::Nyse,
        timezone: chrono_tz::America::New_York,
        open: chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        close: chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        premarket_open: chrono::NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
        holidays: vec![],
    }]));

    let circuit = CircuitBreakerState::new(5, dec!(5_000));
    let trading_loop = Arc::new(TradingLoop::new(
        ledger_repo,
        portfolio_repo,
        security_repo,
        settings_repo.clone(),
        recommendation_repo.clone(),
        broker,
        event_bus,
        queue,
        market_hours,
        "USD".to_string(),
        circuit,
    ));

    Harness { trading_loop, settings_repo, recommendation_repo, _data_dir: data_dir }
}

fn sample_plan(portfolio_hash: &str) -> Plan {
    let now = Utc::now();
    Plan {
        portfolio_hash: portfolio_hash.to_string(),
        pattern: SequencePattern::DirectBuy,
        steps: vec![PlanStep {
            step: ActionStep {
                security_id: "sec-aapl".into(),
                side: OrderSide::Buy,
                quantity: dec!(10),
                expected_price: dec!(150),
                currency: "USD".into(),
                reason_tags: vec!["underweight".into()],
                score_delta: dec!(0.05),
            },
            step_index: 0,
        }],
        robust_score: 0.9,
        aggregate_transaction_cost: dec!(2),
        narrative: "buy underweight AAPL".into(),
        created_at: now,
        expires_at: now + ChronoDuration::hours(6),
    }
}

#[tokio::test]
async fn execute_plan_now_fills_the_cached_recommendation() {
    let harness = build_harness().await;
    let snapshot = harness.trading_loop.status_snapshot().await.unwrap();
    assert!(!snapshot.has_cached_plan);

    let plan = sample_plan(&snapshot.portfolio_hash);
    harness
        .recommendation_repo
        .put(&snapshot.portfolio_hash, &serde_json::to_string(&plan).unwrap(), ChronoDuration::hours(6))
        .await
        .unwrap();

    let trade = harness.trading_loop.execute_plan_now().await.unwrap();
    assert_eq!(trade.security_id, "sec-aapl");
    assert_eq!(trade.side, OrderSide::Buy);
    assert_eq!(trade.quantity, dec!(10));
}

#[tokio::test]
async fn execute_plan_now_rejects_in_research_mode() {
    let harness = build_harness().await;
    harness.settings_repo.set("trading_mode", "research").await.unwrap();

    let snapshot = harness.trading_loop.status_snapshot().await.unwrap();
    let plan = sample_plan(&snapshot.portfolio_hash);
    harness
        .recommendation_repo
        .put(&snapshot.portfolio_hash, &serde_json::to_string(&plan).unwrap(), ChronoDuration::hours(6))
        .await
        .unwrap();

    let err = harness.trading_loop.execute_plan_now().await.unwrap_err();
    assert!(matches!(err, SentinelError::PolicyViolation(_)));
}

#[tokio::test]
async fn execute_plan_now_without_a_cached_plan_is_not_found() {
    let harness = build_harness().await;
    let err = harness.trading_loop.execute_plan_now().await.unwrap_err();
    assert!(matches!(err, SentinelError::NotFound(_)));
}
