//! Monitoring (spec §4.11): read-only health counters surfaced on the
//! admin HTTP API. No write paths live here.

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use crate::db::Store;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub db_reachable: bool,
    pub expired_sessions: i64,
    pub expiring_soon_signals: i64,
    pub stuck_exit_intents: i64,
    pub open_trades: i64,
    pub closed_today: i64,
    pub wins_today: i64,
    pub losses_today: i64,
    pub latest_event_seq: i64,
}

impl Store {
    /// `ACTIVE` sessions whose `token_valid_till` has already passed —
    /// the reconciler should have revoked these but hasn't caught up yet.
    pub fn count_expired_sessions(&self) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.query_row(
            "SELECT COUNT(*) FROM user_broker_sessions
             WHERE deleted_at IS NULL AND session_status = 'ACTIVE' AND token_valid_till < ?1",
            params![now],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    pub fn count_expiring_soon_signals(&self, lookahead: chrono::Duration) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() + lookahead).to_rfc3339();
        conn.query_row(
            "SELECT COUNT(*) FROM signals
             WHERE deleted_at IS NULL AND status IN ('ACTIVE', 'PUBLISHED') AND expires_at <= ?1",
            params![cutoff],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    /// Exit intents stuck non-terminal past `retry_count` retries — a
    /// signal the reconciler keeps failing to place this order.
    pub fn count_stuck_exit_intents(&self, retry_threshold: i64) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM exit_intents
             WHERE deleted_at IS NULL AND status = 'FAILED' AND retry_count >= ?1",
            params![retry_threshold],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    pub fn count_open_trades(&self) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE deleted_at IS NULL AND status IN ('OPEN', 'EXITING')",
            [],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    pub fn count_closed_today(&self) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        let today = Utc::now().date_naive().to_string();
        conn.query_row(
            "SELECT COUNT(*) FROM trades
             WHERE deleted_at IS NULL AND status = 'CLOSED' AND substr(exit_at, 1, 10) = ?1",
            params![today],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    pub fn count_wins_losses_today(&self) -> Result<(i64, i64), AppError> {
        let conn = self.conn.lock();
        let today = Utc::now().date_naive().to_string();
        let wins: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades
             WHERE deleted_at IS NULL AND status = 'CLOSED' AND substr(exit_at, 1, 10) = ?1 AND CAST(realized_pnl AS REAL) > 0",
            params![today],
            |row| row.get(0),
        )?;
        let losses: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades
             WHERE deleted_at IS NULL AND status = 'CLOSED' AND substr(exit_at, 1, 10) = ?1 AND CAST(realized_pnl AS REAL) <= 0",
            params![today],
            |row| row.get(0),
        )?;
        Ok((wins, losses))
    }

    pub fn health_snapshot(&self) -> Result<HealthSnapshot, AppError> {
        let (wins_today, losses_today) = self.count_wins_losses_today()?;
        Ok(HealthSnapshot {
            db_reachable: self.health_check(),
            expired_sessions: self.count_expired_sessions()?,
            expiring_soon_signals: self.count_expiring_soon_signals(chrono::Duration::seconds(300))?,
            stuck_exit_intents: self.count_stuck_exit_intents(3)?,
            open_trades: self.count_open_trades()?,
            closed_today: self.count_closed_today()?,
            wins_today,
            losses_today,
            latest_event_seq: self.latest_seq()?,
        })
    }
}
