//! SQLite connection wrapper, one per store (§6.1).
//!
//! Grounded on the reference architecture's `Database` (`infrastructure/
//! persistence/database.rs`): `SqliteConnectOptions` with WAL, a pooled
//! `SqlitePool`, and idempotent `CREATE TABLE IF NOT EXISTS` migrations run
//! once at startup. Generalized here to one `Database` per store rather
//! than one shared file, since §6.1 gives each store its own pragma profile
//! (ledger fsyncs every commit, cache never does) and its own schema —
//! each repository module owns its table's migration SQL.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tokio::fs;
use tracing::info;

/// Durability profile for a store, driving the `synchronous` pragma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// `ledger`: fsync on every commit, never lose a trade.
    Full,
    /// `universe`, `config`, `portfolio`, `history`: fsync periodically.
    Normal,
    /// `cache`, `client_data`: ephemeral, never fsync.
    Off,
}

impl Durability {
    fn as_pragma(self) -> SqliteSynchronous {
        match self {
            Durability::Full => SqliteSynchronous::Full,
            Durability::Normal => SqliteSynchronous::Normal,
            Durability::Off => SqliteSynchronous::Off,
        }
    }

    /// `cache`/`client_data` are ephemeral and rewritten constantly, so
    /// incremental vacuum would just add bookkeeping for space nobody reads
    /// back; the durable stores reclaim deleted space incrementally instead
    /// of needing a blocking `VACUUM`.
    fn auto_vacuum(self) -> &'static str {
        match self {
            Durability::Full | Durability::Normal => "INCREMENTAL",
            Durability::Off => "NONE",
        }
    }
}

/// Current schema generation. Bumped whenever a repository's migration adds
/// a table/column that an older `schema_version` row would not have.
const SCHEMA_VERSION: i64 = 1;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the SQLite file at `path` with WAL mode
    /// and the pragma profile for `durability`. Schema migration is left to
    /// the caller (each store's repository runs its own `CREATE TABLE IF
    /// NOT EXISTS` against the returned pool).
    pub async fn open(path: &Path, durability: Durability) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(&path.to_string_lossy())?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(durability.as_pragma())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to {}", path.display()))?;

        sqlx::query(&format!("PRAGMA auto_vacuum = {}", durability.auto_vacuum()))
            .execute(&pool)
            .await
            .context("failed to set auto_vacuum pragma")?;

        ensure_schema_version(&pool).await?;

        info!(path = %path.display(), "opened store");
        Ok(Self { pool })
    }

    /// `:memory:` store for tests; each connection in the pool gets its own
    /// database unless capped to one connection, so tests must use this
    /// rather than the bare `sqlite::memory:` URL.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open in-memory database")?;
        ensure_schema_version(&pool).await?;
        Ok(Self { pool })
    }
}

/// Idempotent `schema_version` bookkeeping, run once per store at startup
/// (§6.1). Each repository still owns its own table's `CREATE TABLE IF NOT
/// EXISTS` migration; this only records which schema generation the store
/// was last opened at, so a future migration can tell a fresh store from
/// one that needs an upgrade.
async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("failed to create schema_version table")?;

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("failed to read schema_version")?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .context("failed to seed schema_version")?;
        }
        Some((version,)) if version < SCHEMA_VERSION => {
            sqlx::query("UPDATE schema_version SET version = ?")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .context("failed to bump schema_version")?;
        }
        Some((version,)) if version > SCHEMA_VERSION => {
            anyhow::bail!(
                "store schema_version {version} is newer than this binary supports ({SCHEMA_VERSION})"
            );
        }
        Some(_) => {}
    }

    Ok(())
}
