//! Event log (spec §4.2): an append-only, server-sequenced audit trail.
//!
//! Every domain mutation appends one row here in the same transaction as
//! the mutation itself, the same discipline the teacher's `db_storage`
//! uses for its FTS5 shadow table. `seq` is a SQLite `AUTOINCREMENT`
//! primary key, so append order and read order always agree.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Store;
use crate::error::AppError;
use crate::models::event::{EventFilter, EventScope, NewTradeEvent, TradeEvent};

fn opt_uuid(row: &Row, idx: &str) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| Uuid::parse_str(&s).ok()))
}

fn row_to_event(row: &Row) -> rusqlite::Result<TradeEvent> {
    let payload_raw: String = row.get("payload_json")?;
    let scope_raw: String = row.get("scope")?;
    let created_at_raw: String = row.get("created_at")?;
    Ok(TradeEvent {
        seq: row.get("seq")?,
        event_type: row.get("event_type")?,
        scope: EventScope::from_str(&scope_raw),
        user_id: opt_uuid(row, "user_id")?,
        broker_id: opt_uuid(row, "broker_id")?,
        user_broker_id: opt_uuid(row, "user_broker_id")?,
        payload: serde_json::from_str(&payload_raw).unwrap_or(serde_json::Value::Null),
        signal_id: opt_uuid(row, "signal_id")?,
        intent_id: opt_uuid(row, "intent_id")?,
        trade_id: opt_uuid(row, "trade_id")?,
        order_id: row.get("order_id")?,
        created_at: created_at_raw
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        created_by: row.get("created_by")?,
    })
}

pub(crate) fn append_tx(conn: &Connection, event: &NewTradeEvent) -> Result<i64, AppError> {
    let payload_json = serde_json::to_string(&event.payload)
        .map_err(|e| AppError::Internal(format!("event payload serialize: {e}")))?;
    conn.execute(
        "INSERT INTO trade_events (
            event_type, scope, user_id, broker_id, user_broker_id, payload_json,
            signal_id, intent_id, trade_id, order_id, created_at, created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.event_type,
            event.scope.as_str(),
            event.user_id.map(|u| u.to_string()),
            event.broker_id.map(|u| u.to_string()),
            event.user_broker_id.map(|u| u.to_string()),
            payload_json,
            event.signal_id.map(|u| u.to_string()),
            event.intent_id.map(|u| u.to_string()),
            event.trade_id.map(|u| u.to_string()),
            event.order_id,
            Utc::now().to_rfc3339(),
            event.created_by,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    /// Appends one event, returning its assigned `seq`.
    pub fn append_event(&self, event: &NewTradeEvent) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        append_tx(&conn, event)
    }

    /// Tails the log after `after_seq`, filtered by `filter`'s scope
    /// predicate (spec §4.2): GLOBAL rows always match, USER rows match
    /// on `user_id`, USER_BROKER rows match on `user_broker_id`.
    pub fn list_events(
        &self,
        filter: &EventFilter,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<TradeEvent>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_events
             WHERE seq > ?1
               AND (
                    scope = 'GLOBAL'
                    OR (scope = 'USER' AND user_id = ?2)
                    OR (scope = 'USER_BROKER' AND user_broker_id = ?3)
               )
             ORDER BY seq ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                after_seq,
                filter.user_id.map(|u| u.to_string()),
                filter.user_broker_id.map(|u| u.to_string()),
                limit,
            ],
            row_to_event,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// The highest `seq` assigned so far, or 0 if the log is empty.
    pub fn latest_seq(&self) -> Result<i64, AppError> {
        let conn = self.conn.lock();
        let seq: Option<i64> = conn
            .query_row("SELECT MAX(seq) FROM trade_events", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_seq() {
        let store = Store::open_in_memory().unwrap();
        let e1 = NewTradeEvent::global("SIGNAL_CREATED", "system");
        let e2 = NewTradeEvent::global("SIGNAL_CREATED", "system");
        let seq1 = store.append_event(&e1).unwrap();
        let seq2 = store.append_event(&e2).unwrap();
        assert!(seq2 > seq1);
        assert_eq!(store.latest_seq().unwrap(), seq2);
    }

    #[test]
    fn user_broker_scope_filters_by_id() {
        let store = Store::open_in_memory().unwrap();
        let ub1 = Uuid::new_v4();
        let ub2 = Uuid::new_v4();
        store
            .append_event(&NewTradeEvent::user_broker("ORDER_PLACED", ub1, "system"))
            .unwrap();
        store
            .append_event(&NewTradeEvent::user_broker("ORDER_PLACED", ub2, "system"))
            .unwrap();
        let filter = EventFilter {
            user_id: None,
            user_broker_id: Some(ub1),
        };
        let events = store.list_events(&filter, 0, 100).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_broker_id, Some(ub1));
    }
}
