//! Delivery Manager (spec §4.4): fans a PUBLISHED signal out to every
//! eligible user-broker, then lets exactly one of that user-broker's
//! subsequent actions (or no action) consume it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::Store;
use crate::error::AppError;
use crate::events::append_tx;
use crate::models::broker::RiskPolicy;
use crate::models::delivery::{DeliveryStatus, SignalDelivery};
use crate::models::event::NewTradeEvent;

fn row_to_delivery(row: &Row) -> rusqlite::Result<SignalDelivery> {
    let status_raw: String = row.get("status")?;
    Ok(SignalDelivery {
        delivery_id: Uuid::parse_str(&row.get::<_, String>("delivery_id")?).unwrap_or_default(),
        signal_id: Uuid::parse_str(&row.get::<_, String>("signal_id")?).unwrap_or_default(),
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        status: DeliveryStatus::from_str(&status_raw),
        intent_id: row
            .get::<_, Option<String>>("intent_id")?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        rejection_reason: row.get("rejection_reason")?,
        user_action: row.get("user_action")?,
        consumed_at: row
            .get::<_, Option<String>>("consumed_at")?
            .map(|s| s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .map(|s| s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())),
        version: row.get("version")?,
    })
}

/// Creates one CREATED delivery per enabled, EXEC-role, ACTIVE user-broker
/// eligible for `signal_id`'s symbol (spec §4.4). Skips user-brokers that
/// already have a non-deleted delivery for this signal.
pub(crate) fn fan_out_tx(
    conn: &Connection,
    signal_id: Uuid,
    symbol: &str,
) -> Result<Vec<Uuid>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT ub.user_broker_id, ub.risk_policy_json FROM user_brokers ub
         WHERE ub.deleted_at IS NULL AND ub.enabled = 1 AND ub.role = 'EXEC' AND ub.status = 'ACTIVE'
           AND NOT EXISTS (
               SELECT 1 FROM watchlist_entries we
               WHERE we.user_broker_id = ub.user_broker_id AND we.symbol = ?1
                 AND we.deleted_at IS NULL AND we.enabled = 0
           )
           AND NOT EXISTS (
               SELECT 1 FROM signal_deliveries sd
               WHERE sd.signal_id = ?2 AND sd.user_broker_id = ub.user_broker_id AND sd.deleted_at IS NULL
           )",
    )?;
    let candidates: Vec<(String, String)> = stmt
        .query_map(params![symbol, signal_id.to_string()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    // The allow list lives in `risk_policy_json`, not a SQL-indexable
    // column, so it's filtered here rather than in the query (spec §3,
    // §4.4: "symbol in allow list if one is configured").
    let eligible: Vec<String> = candidates
        .into_iter()
        .filter(|(_, risk_policy_json)| {
            let policy: RiskPolicy = serde_json::from_str(risk_policy_json).unwrap_or_default();
            policy
                .allow_symbols
                .as_ref()
                .map(|allowed| allowed.iter().any(|s| s == symbol))
                .unwrap_or(true)
        })
        .map(|(user_broker_id, _)| user_broker_id)
        .collect();

    let now = Utc::now().to_rfc3339();
    let mut created = Vec::new();
    for user_broker_id in eligible {
        let delivery_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO signal_deliveries (
                delivery_id, signal_id, user_broker_id, status, intent_id,
                rejection_reason, user_action, consumed_at,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, 'CREATED', NULL, NULL, NULL, NULL, ?4, ?4, NULL, 1)",
            params![delivery_id.to_string(), signal_id.to_string(), user_broker_id, now],
        )?;
        append_tx(
            conn,
            &NewTradeEvent::user_broker(
                "DELIVERY_CREATED",
                Uuid::parse_str(&user_broker_id).unwrap_or_default(),
                "system",
            )
            .with_signal(signal_id),
        )?;
        created.push(delivery_id);
    }
    Ok(created)
}

/// The race-free primitive from spec §4.4: a single `UPDATE ... WHERE
/// status IN ('CREATED','DELIVERED')` either claims the delivery for
/// `intent_id` (returns `true`) or loses the race to a prior consumer
/// (returns `false`). Two concurrent callers racing on the same delivery
/// can never both return `true`.
pub(crate) fn consume_delivery_tx(
    conn: &Connection,
    delivery_id: Uuid,
    intent_id: Uuid,
) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let affected = conn.execute(
        "UPDATE signal_deliveries
         SET status = 'CONSUMED', intent_id = ?1, consumed_at = ?2, updated_at = ?2
         WHERE delivery_id = ?3 AND status IN ('CREATED', 'DELIVERED') AND deleted_at IS NULL",
        params![intent_id.to_string(), now, delivery_id.to_string()],
    )?;
    Ok(affected > 0)
}

pub(crate) fn expire_all_for_signal_tx(conn: &Connection, signal_id: Uuid) -> Result<u64, AppError> {
    transition_non_terminal_tx(conn, signal_id, DeliveryStatus::Expired)
}

pub(crate) fn cancel_all_for_signal_tx(conn: &Connection, signal_id: Uuid) -> Result<u64, AppError> {
    transition_non_terminal_tx(conn, signal_id, DeliveryStatus::Cancelled)
}

fn transition_non_terminal_tx(
    conn: &Connection,
    signal_id: Uuid,
    to: DeliveryStatus,
) -> Result<u64, AppError> {
    let now = Utc::now().to_rfc3339();
    let affected = conn.execute(
        "UPDATE signal_deliveries
         SET status = ?1, updated_at = ?2
         WHERE signal_id = ?3 AND status IN ('CREATED', 'DELIVERED') AND deleted_at IS NULL",
        params![to.as_str(), now, signal_id.to_string()],
    )?;
    Ok(affected as u64)
}

impl Store {
    /// Publishes a signal to every eligible user-broker (spec §4.3/§4.4:
    /// called when a signal transitions ACTIVE -> PUBLISHED).
    pub fn fan_out_deliveries(&self, signal_id: Uuid, symbol: &str) -> Result<Vec<Uuid>, AppError> {
        let conn = self.conn.lock();
        fan_out_tx(&conn, signal_id, symbol)
    }

    /// Atomically claims a delivery for `intent_id`. Returns `false` (not
    /// an error) if another intent already consumed it or it expired
    /// first — the Entry Intent Pipeline treats that as a routine
    /// "too late" outcome (spec §4.4, §4.5).
    pub fn consume_delivery(&self, delivery_id: Uuid, intent_id: Uuid) -> Result<bool, AppError> {
        let conn = self.conn.lock();
        consume_delivery_tx(&conn, delivery_id, intent_id)
    }

    pub fn expire_all_for_signal(&self, signal_id: Uuid) -> Result<u64, AppError> {
        let conn = self.conn.lock();
        expire_all_for_signal_tx(&conn, signal_id)
    }

    pub fn cancel_all_for_signal(&self, signal_id: Uuid) -> Result<u64, AppError> {
        let conn = self.conn.lock();
        cancel_all_for_signal_tx(&conn, signal_id)
    }

    pub fn find_deliveries_for_signal(&self, signal_id: Uuid) -> Result<Vec<SignalDelivery>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM signal_deliveries WHERE signal_id = ?1 AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![signal_id.to_string()], row_to_delivery)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn find_delivery(&self, delivery_id: Uuid) -> Result<SignalDelivery, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM signal_deliveries WHERE delivery_id = ?1 AND deleted_at IS NULL",
            params![delivery_id.to_string()],
            row_to_delivery,
        )
        .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user_broker(conn: &Connection, role: &str, status: &str, enabled: i64) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO user_brokers (
                user_broker_id, user_id, broker_id, role, credentials, connected,
                last_connected, connection_error, risk_policy_json, status, enabled,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, 'x', 0, NULL, NULL, '{}', ?5, ?6, ?7, ?7, NULL, 1)",
            params![id.to_string(), Uuid::new_v4().to_string(), Uuid::new_v4().to_string(), role, status, enabled, now],
        )
        .unwrap();
        id
    }

    #[test]
    fn consume_delivery_is_single_use() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn.lock();
        let ub = make_user_broker(&conn, "EXEC", "ACTIVE", 1);
        let signal_id = Uuid::new_v4();
        let delivery_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO signal_deliveries (delivery_id, signal_id, user_broker_id, status, intent_id, rejection_reason, user_action, consumed_at, created_at, updated_at, deleted_at, version)
             VALUES (?1, ?2, ?3, 'CREATED', NULL, NULL, NULL, NULL, ?4, ?4, NULL, 1)",
            params![delivery_id.to_string(), signal_id.to_string(), ub.to_string(), now],
        ).unwrap();
        drop(conn);

        let intent_a = Uuid::new_v4();
        let intent_b = Uuid::new_v4();
        let first = store.consume_delivery(delivery_id, intent_a).unwrap();
        let second = store.consume_delivery(delivery_id, intent_b).unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn fan_out_skips_disabled_user_brokers() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn.lock();
        make_user_broker(&conn, "EXEC", "ACTIVE", 0);
        let active = make_user_broker(&conn, "EXEC", "ACTIVE", 1);
        drop(conn);

        let signal_id = Uuid::new_v4();
        let created = store.fan_out_deliveries(signal_id, "RELIANCE").unwrap();
        assert_eq!(created.len(), 1);
        let delivery = store.find_deliveries_for_signal(signal_id).unwrap();
        assert_eq!(delivery[0].user_broker_id, active);
    }
}
