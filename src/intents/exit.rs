//! Exit Intent Pipeline (spec §4.6): detecting an exit condition on an
//! open trade, numbering it as an "episode" so repeated detections of
//! the same condition within one trade don't double-exit, and placing
//! (or retrying) the exit order.

use chrono::Utc;
use rusqlite::{params, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::broker::adapter::{BrokerAdapter, OrderRequest, OrderSide};
use crate::db::Store;
use crate::error::AppError;
use crate::events::append_tx;
use crate::models::event::NewTradeEvent;
use crate::models::exit::{ExitIntent, ExitIntentStatus, ExitReason, ExitSignal, ExitSignalStatus};
use crate::models::intent::OrderType;
use crate::intents::entry::row_to_trade;
use crate::models::trade::Trade;

/// What the caller observed when it decided a trade should exit (spec
/// §4.6: target/stop/trailing-stop/manual/timeout detection context).
#[derive(Debug, Clone)]
pub struct ExitDetection {
    pub trade_id: Uuid,
    pub exit_reason: ExitReason,
    pub detected_price: Decimal,
    pub brick_movement: Option<Decimal>,
    pub favorable_movement: Option<Decimal>,
    pub highest_since_entry: Option<Decimal>,
    pub lowest_since_entry: Option<Decimal>,
    pub trailing_stop_price: Option<Decimal>,
}

fn row_to_exit_signal(row: &Row) -> rusqlite::Result<ExitSignal> {
    let reason_raw: String = row.get("exit_reason")?;
    let status_raw: String = row.get("status")?;
    Ok(ExitSignal {
        exit_signal_id: Uuid::parse_str(&row.get::<_, String>("exit_signal_id")?).unwrap_or_default(),
        trade_id: Uuid::parse_str(&row.get::<_, String>("trade_id")?).unwrap_or_default(),
        exit_reason: ExitReason::from_str(&reason_raw),
        episode_id: row.get("episode_id")?,
        status: ExitSignalStatus::from_str(&status_raw),
        detected_price: row.get::<_, String>("detected_price")?.parse().unwrap_or(Decimal::ZERO),
        brick_movement: row.get::<_, Option<String>>("brick_movement")?.and_then(|s| s.parse().ok()),
        favorable_movement: row.get::<_, Option<String>>("favorable_movement")?.and_then(|s| s.parse().ok()),
        highest_since_entry: row.get::<_, Option<String>>("highest_since_entry")?.and_then(|s| s.parse().ok()),
        lowest_since_entry: row.get::<_, Option<String>>("lowest_since_entry")?.and_then(|s| s.parse().ok()),
        trailing_stop_price: row.get::<_, Option<String>>("trailing_stop_price")?.and_then(|s| s.parse().ok()),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

fn row_to_exit_intent(row: &Row) -> rusqlite::Result<ExitIntent> {
    let reason_raw: String = row.get("exit_reason")?;
    let status_raw: String = row.get("status")?;
    Ok(ExitIntent {
        exit_intent_id: Uuid::parse_str(&row.get::<_, String>("exit_intent_id")?).unwrap_or_default(),
        exit_signal_id: Uuid::parse_str(&row.get::<_, String>("exit_signal_id")?).unwrap_or_default(),
        trade_id: Uuid::parse_str(&row.get::<_, String>("trade_id")?).unwrap_or_default(),
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        exit_reason: ExitReason::from_str(&reason_raw),
        episode_id: row.get("episode_id")?,
        status: ExitIntentStatus::from_str(&status_raw),
        broker_order_id: row.get("broker_order_id")?,
        error_code: row.get("error_code")?,
        error_message: row.get("error_message")?,
        retry_count: row.get("retry_count")?,
        placed_at: row.get::<_, Option<String>>("placed_at")?.and_then(|s| s.parse().ok()),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

impl Store {
    /// Race-free primitive (spec §4.6): computes the next episode number
    /// for `(trade_id, exit_reason)` and inserts the `ExitSignal` in the
    /// same `BEGIN IMMEDIATE` transaction the shared connection already
    /// serializes every write through, so two concurrent detectors of the
    /// same condition can never both claim episode 1.
    pub fn generate_exit_episode(&self, detection: &ExitDetection) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        let next_episode: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(episode_id), 0) + 1 FROM exit_signals
                 WHERE trade_id = ?1 AND exit_reason = ?2",
                params![detection.trade_id.to_string(), detection.exit_reason.as_str()],
                |row| row.get(0),
            )?;

        let exit_signal_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO exit_signals (
                exit_signal_id, trade_id, exit_reason, episode_id, status, detected_price,
                brick_movement, favorable_movement, highest_since_entry, lowest_since_entry,
                trailing_stop_price, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, 'DETECTED', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, NULL, 1)",
            params![
                exit_signal_id.to_string(),
                detection.trade_id.to_string(),
                detection.exit_reason.as_str(),
                next_episode,
                detection.detected_price.to_string(),
                detection.brick_movement.map(|d| d.to_string()),
                detection.favorable_movement.map(|d| d.to_string()),
                detection.highest_since_entry.map(|d| d.to_string()),
                detection.lowest_since_entry.map(|d| d.to_string()),
                detection.trailing_stop_price.map(|d| d.to_string()),
                now,
            ],
        )?;

        append_tx(
            &conn,
            &NewTradeEvent::global("EXIT_EPISODE_GENERATED", "system")
                .with_trade(detection.trade_id)
                .with_payload(serde_json::json!({
                    "exit_reason": detection.exit_reason.as_str(),
                    "episode_id": next_episode,
                })),
        )?;

        Ok(next_episode)
    }

    /// Creates a PENDING `ExitIntent` for an `ExitSignal` (spec §4.6).
    pub fn create_exit_intent(
        &self,
        exit_signal_id: Uuid,
        trade_id: Uuid,
        user_broker_id: Uuid,
        exit_reason: ExitReason,
        episode_id: i64,
    ) -> Result<ExitIntent, AppError> {
        let conn = self.conn.lock();
        let exit_intent_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO exit_intents (
                exit_intent_id, exit_signal_id, trade_id, user_broker_id, exit_reason, episode_id,
                status, broker_order_id, error_code, error_message, retry_count, placed_at,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', NULL, NULL, NULL, 0, NULL, ?7, ?7, NULL, 1)",
            params![
                exit_intent_id.to_string(),
                exit_signal_id.to_string(),
                trade_id.to_string(),
                user_broker_id.to_string(),
                exit_reason.as_str(),
                episode_id,
                now,
            ],
        )?;
        conn.query_row(
            "SELECT * FROM exit_intents WHERE exit_intent_id = ?1 AND deleted_at IS NULL",
            params![exit_intent_id.to_string()],
            row_to_exit_intent,
        )
        .map_err(AppError::from)
    }

    pub fn find_exit_intent(&self, exit_intent_id: Uuid) -> Result<ExitIntent, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM exit_intents WHERE exit_intent_id = ?1 AND deleted_at IS NULL",
            params![exit_intent_id.to_string()],
            row_to_exit_intent,
        )
        .map_err(AppError::from)
    }

    /// Step 3 (spec §4.6): validates a PENDING exit intent, then approves
    /// it and puts the trade into EXITING before any order can be placed
    /// against it — a fresh entry can never land on a trade that's mid-exit
    /// (spec §4.5/§4.6, §9). Returns `ConflictState` if the intent wasn't
    /// PENDING, since approval is single-use.
    pub fn approve_exit_intent(&self, exit_intent_id: Uuid) -> Result<ExitIntent, AppError> {
        let conn = self.conn.lock();
        let intent = conn.query_row(
            "SELECT * FROM exit_intents WHERE exit_intent_id = ?1 AND deleted_at IS NULL",
            params![exit_intent_id.to_string()],
            row_to_exit_intent,
        )?;
        if intent.status != ExitIntentStatus::Pending {
            return Err(AppError::ConflictState(format!(
                "exit intent {exit_intent_id} is not PENDING (status={:?})",
                intent.status
            )));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE exit_intents SET status = 'APPROVED', updated_at = ?1
             WHERE exit_intent_id = ?2 AND status = 'PENDING' AND deleted_at IS NULL",
            params![now, exit_intent_id.to_string()],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictState(format!("exit intent {exit_intent_id} was concurrently claimed")));
        }

        conn.execute(
            "UPDATE exit_signals SET status = 'ACTIONED', updated_at = ?1
             WHERE exit_signal_id = ?2 AND deleted_at IS NULL",
            params![now, intent.exit_signal_id.to_string()],
        )?;

        let trade: (String, i64) = conn.query_row(
            "SELECT trade_id, version FROM trades WHERE trade_id = ?1 AND deleted_at IS NULL",
            params![intent.trade_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        conn.execute(
            "UPDATE trades SET status = 'EXITING', updated_at = ?1, version = version + 1
             WHERE trade_id = ?2 AND version = ?3",
            params![now, trade.0, trade.1],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("trades({}, version={})", trade.0, trade.1)));
        }

        append_tx(
            &conn,
            &NewTradeEvent::global("EXIT_INTENT_APPROVED", "system")
                .with_trade(intent.trade_id)
                .with_intent(exit_intent_id)
                .with_payload(serde_json::json!({"exit_reason": intent.exit_reason.as_str()})),
        )?;

        conn.query_row(
            "SELECT * FROM exit_intents WHERE exit_intent_id = ?1 AND deleted_at IS NULL",
            params![exit_intent_id.to_string()],
            row_to_exit_intent,
        )
        .map_err(AppError::from)
    }

    /// Race-free primitive (spec §4.6, §8): claims the exit intent for
    /// placement with a single conditional `UPDATE` from APPROVED only.
    /// Returns `false` (not an error) for any other status — PENDING,
    /// already PLACED, FAILED, or CANCELLED — so a caller that skipped
    /// approval or double-fires placement never wins twice.
    pub fn place_exit_order(&self, exit_intent_id: Uuid, broker_order_id: &str) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let affected = conn.execute(
            "UPDATE exit_intents
             SET status = 'PLACED', broker_order_id = ?1, placed_at = ?2, updated_at = ?2
             WHERE exit_intent_id = ?3 AND status = 'APPROVED' AND deleted_at IS NULL",
            params![broker_order_id, now, exit_intent_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// PLACED -> FILLED once the broker confirms the fill (spec §4.6).
    pub fn mark_filled(&self, exit_intent_id: Uuid) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let affected = conn.execute(
            "UPDATE exit_intents SET status = 'FILLED', updated_at = ?1
             WHERE exit_intent_id = ?2 AND status = 'PLACED' AND deleted_at IS NULL",
            params![now, exit_intent_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Orchestrates placing the exit order against the adapter, then
    /// calling [`Store::place_exit_order`] to record the outcome — the
    /// adapter call happens outside the lock so a slow broker never
    /// blocks the shared connection (spec §4.6). Requires the intent to
    /// already be APPROVED; `detect_exit` + [`Store::approve_exit_intent`]
    /// must run first.
    pub async fn execute_exit_order(
        &self,
        exit_intent_id: Uuid,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        adapter: &dyn BrokerAdapter,
    ) -> Result<bool, AppError> {
        let intent = self.find_exit_intent(exit_intent_id)?;
        if intent.status != ExitIntentStatus::Approved {
            return Err(AppError::ConflictState(format!(
                "exit intent {exit_intent_id} is not APPROVED (status={:?})",
                intent.status
            )));
        }
        let request = OrderRequest {
            client_order_id: exit_intent_id,
            symbol: String::new(),
            side: OrderSide::Sell,
            quantity,
            order_type: if limit_price.is_some() { OrderType::Limit } else { OrderType::Market },
            limit_price,
        };

        match adapter.place_order(request).await {
            Ok(ack) => {
                let claimed = self.place_exit_order(exit_intent_id, &ack.broker_order_id)?;
                if claimed {
                    self.mark_filled(exit_intent_id)?;
                    self.mark_trade_closed(
                        intent.trade_id,
                        ack.fill_price.unwrap_or(Decimal::ZERO),
                        intent.exit_reason,
                        &ack.broker_order_id,
                    )?;
                }
                Ok(claimed)
            }
            Err(e) => {
                self.mark_exit_intent_failed(exit_intent_id, &e)?;
                Err(e)
            }
        }
    }

    pub fn mark_exit_intent_failed(&self, exit_intent_id: Uuid, error: &AppError) -> Result<(), AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE exit_intents
             SET status = 'FAILED', error_code = ?1, error_message = ?2, retry_count = retry_count + 1, updated_at = ?3
             WHERE exit_intent_id = ?4 AND deleted_at IS NULL",
            params!["EXIT_ORDER_FAILED", error.to_string(), now, exit_intent_id.to_string()],
        )?;
        Ok(())
    }

    pub fn mark_exit_intent_cancelled(&self, exit_intent_id: Uuid) -> Result<(), AppError> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE exit_intents SET status = 'CANCELLED', updated_at = ?1
             WHERE exit_intent_id = ?2 AND status IN ('PENDING', 'APPROVED') AND deleted_at IS NULL",
            params![now, exit_intent_id.to_string()],
        )?;
        Ok(())
    }

    fn mark_trade_closed(
        &self,
        trade_id: Uuid,
        exit_price: Decimal,
        exit_reason: ExitReason,
        exit_order_id: &str,
    ) -> Result<Trade, AppError> {
        let conn = self.conn.lock();
        let existing: (String, i64) = conn.query_row(
            "SELECT trade_id, version FROM trades WHERE trade_id = ?1 AND deleted_at IS NULL",
            params![trade_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let now = Utc::now();
        conn.execute(
            "UPDATE trades SET
                status = 'CLOSED', exit_price = ?1, exit_at = ?2, exit_trigger = ?3, exit_order_id = ?4,
                updated_at = ?2, version = version + 1
             WHERE trade_id = ?5 AND version = ?6",
            params![exit_price.to_string(), now.to_rfc3339(), exit_reason.as_str(), exit_order_id, existing.0, existing.1],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("trades({}, version={})", existing.0, existing.1)));
        }
        append_tx(
            &conn,
            &NewTradeEvent::global("TRADE_CLOSED", "system")
                .with_trade(trade_id)
                .with_payload(serde_json::json!({"exit_reason": exit_reason.as_str()})),
        )?;
        conn.query_row(
            "SELECT * FROM trades WHERE trade_id = ?1 AND deleted_at IS NULL",
            params![trade_id.to_string()],
            row_to_trade,
        )
        .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(store: &Store) -> Uuid {
        let conn = store.conn.lock();
        let trade_id = Uuid::new_v4();
        let intent_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO trades (
                trade_id, intent_id, signal_id, user_broker_id, status, quantity, entry_price, entry_value,
                product_type, zones_json, entry_band_low, entry_band_high, log_impact, target_price, stop_price,
                current_price, current_log_return, unrealized_pnl, trailing_stop_active, trailing_stop_highest_price,
                trailing_stop_stop_price, exit_price, exit_at, exit_trigger, exit_order_id, realized_pnl,
                realized_log_return, holding_days, broker_order_id, broker_trade_id, client_order_id,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, NULL, NULL, 'OPEN', '10', '100', '1000', 'CNC', NULL, NULL, NULL, NULL, NULL, NULL,
                NULL, NULL, NULL, 0, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL,
                ?3, ?3, NULL, 1)",
            params![trade_id.to_string(), intent_id.to_string(), now],
        )
        .unwrap();
        trade_id
    }

    #[test]
    fn generate_exit_episode_increments_per_trade_and_reason() {
        let store = Store::open_in_memory().unwrap();
        let trade_id = make_trade(&store);
        let detection = ExitDetection {
            trade_id,
            exit_reason: ExitReason::TargetHit,
            detected_price: Decimal::new(110, 0),
            brick_movement: None,
            favorable_movement: None,
            highest_since_entry: None,
            lowest_since_entry: None,
            trailing_stop_price: None,
        };
        let ep1 = store.generate_exit_episode(&detection).unwrap();
        let ep2 = store.generate_exit_episode(&detection).unwrap();
        assert_eq!(ep1, 1);
        assert_eq!(ep2, 2);
    }

    fn make_exit_intent(store: &Store, trade_id: Uuid, reason: ExitReason) -> ExitIntent {
        let detection = ExitDetection {
            trade_id,
            exit_reason: reason,
            detected_price: Decimal::new(90, 0),
            brick_movement: None,
            favorable_movement: None,
            highest_since_entry: None,
            lowest_since_entry: None,
            trailing_stop_price: None,
        };
        let episode = store.generate_exit_episode(&detection).unwrap();
        let exit_signal_id = {
            let conn = store.conn.lock();
            let id: String = conn
                .query_row(
                    "SELECT exit_signal_id FROM exit_signals WHERE trade_id = ?1 AND episode_id = ?2",
                    params![trade_id.to_string(), episode],
                    |row| row.get(0),
                )
                .unwrap();
            Uuid::parse_str(&id).unwrap()
        };
        store
            .create_exit_intent(exit_signal_id, trade_id, Uuid::new_v4(), reason, episode)
            .unwrap()
    }

    #[test]
    fn place_exit_order_requires_prior_approval() {
        let store = Store::open_in_memory().unwrap();
        let trade_id = make_trade(&store);
        let intent = make_exit_intent(&store, trade_id, ExitReason::StopHit);

        let rejected = store.place_exit_order(intent.exit_intent_id, "BROKER-1").unwrap();
        assert!(!rejected, "a PENDING exit intent must not be placeable");

        let approved = store.approve_exit_intent(intent.exit_intent_id).unwrap();
        assert_eq!(approved.status, ExitIntentStatus::Approved);
        let trade = store.find_trade(trade_id).unwrap();
        assert_eq!(trade.status, crate::models::trade::TradeStatus::Exiting);
    }

    #[test]
    fn place_exit_order_is_single_use() {
        let store = Store::open_in_memory().unwrap();
        let trade_id = make_trade(&store);
        let intent = make_exit_intent(&store, trade_id, ExitReason::StopHit);
        store.approve_exit_intent(intent.exit_intent_id).unwrap();

        let first = store.place_exit_order(intent.exit_intent_id, "BROKER-1").unwrap();
        let second = store.place_exit_order(intent.exit_intent_id, "BROKER-2").unwrap();
        assert!(first);
        assert!(!second);
    }
}
