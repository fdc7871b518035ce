//! Database initialization
//!
//! Opens (or creates) the SQLite store shared by the ingestion pipeline and
//! the read-side service, and provisions the two tables idempotently.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection; lock contention beyond
/// this surfaces as a transient error and is retried by the writer
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        // WAL lets the read-side service query while ingestion writes
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_tables(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema (tests, dry runs)
///
/// A single connection is used because every SQLite `:memory:` connection is
/// its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_shipments_table(pool).await?;
    create_shipment_events_table(pool).await?;
    Ok(())
}

/// Tracked entities, keyed by the feed's stable identifier
pub async fn create_shipments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shipments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tracking_id TEXT NOT NULL UNIQUE,
            origin TEXT,
            destination TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only classified observations
///
/// The last `CHECK` mirrors the status/reason pairing so a logic defect
/// fails the write instead of persisting an inconsistent row.
pub async fn create_shipment_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shipment_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            shipment_id INTEGER NOT NULL REFERENCES shipments(id),
            timestamp TEXT NOT NULL,
            location TEXT,
            raw_status_text TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('OnTime', 'Delayed', 'Delivered')),
            delay_reason TEXT CHECK (delay_reason IN ('Weather', 'Customs', 'PortCongestion', 'Other')),
            latitude REAL NOT NULL CHECK (latitude BETWEEN -90.0 AND 90.0),
            longitude REAL NOT NULL CHECK (longitude BETWEEN -180.0 AND 180.0),
            created_at TEXT NOT NULL,
            CHECK ((status = 'Delayed') = (delay_reason IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_shipment_events_shipment_time \
         ON shipment_events(shipment_id, timestamp DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_shipment_events_status ON shipment_events(status)")
        .execute(pool)
        .await?;

    Ok(())
}
