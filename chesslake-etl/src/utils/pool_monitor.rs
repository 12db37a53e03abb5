//! Transaction timing
//!
//! Wraps `pool.begin()` so that every write transaction logs how long it waited
//! for a connection and how long it held it.

use chesslake_common::Result;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
///
/// Dropping it without `commit` rolls the transaction back.
pub struct MonitoredTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Commit the transaction and log release timing
    pub async fn commit(self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        self.tx.commit().await?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "Long transaction, connection held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }

        Ok(())
    }
}

/// Begin a monitored transaction
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "scd2::merge").await?;
/// sqlx::query("...").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;
    let acquired_at = Instant::now();

    let wait_ms = acquired_at.duration_since(start).as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        caller,
        acquired_at,
    })
}
