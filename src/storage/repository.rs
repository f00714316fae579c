use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{MIGRATION_001_LEDGER, MIGRATION_002_AUCTIONS};

/// Store for wallets, the transaction log, auctions and bids.
///
/// Backed by SQLite: `in_memory` keeps everything process-local and is lost on
/// exit, `open` uses a database file. Clones share the same pool.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A fresh, migrated, process-local store.
    ///
    /// An in-memory SQLite database lives as long as its connection, so the
    /// pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database options")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    /// Open (creating if needed) and migrate a database file.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))
            .with_context(|| format!("Invalid database path: {}", path))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", path))?;

        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    /// Run database migrations. Safe to repeat.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_LEDGER)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::raw_sql(MIGRATION_002_AUCTIONS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }
}

/// Fixed-width RFC 3339, so stored timestamps sort lexicographically and
/// round-trip exactly.
pub(super) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(super) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp: {}", column, value))?
        .with_timezone(&Utc))
}
