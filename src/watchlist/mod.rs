//! Watchlist Hierarchy (spec §4.9): L1 Templates (curated symbol lists),
//! L2 Selected (named subsets a user turns on), L3 Default (the merged
//! view of every enabled Selected list), L4 per-user-broker rows that
//! sync from L3 but preserve any row a user added by hand (`is_custom`).

use chrono::Utc;
use rusqlite::{params, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::{current_version, Store};
use crate::error::AppError;
use crate::models::watchlist::{WatchlistEntry, WatchlistSelected, WatchlistTemplate};

fn row_to_template(row: &Row) -> rusqlite::Result<WatchlistTemplate> {
    let symbols_raw: String = row.get("symbols_json")?;
    Ok(WatchlistTemplate {
        template_id: Uuid::parse_str(&row.get::<_, String>("template_id")?).unwrap_or_default(),
        name: row.get("name")?,
        symbols: serde_json::from_str(&symbols_raw).unwrap_or_default(),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .map(|s| s.parse().unwrap_or_else(|_| Utc::now())),
        version: row.get("version")?,
    })
}

fn row_to_selected(row: &Row) -> rusqlite::Result<WatchlistSelected> {
    let symbols_raw: String = row.get("symbols_json")?;
    Ok(WatchlistSelected {
        selected_id: Uuid::parse_str(&row.get::<_, String>("selected_id")?).unwrap_or_default(),
        template_id: Uuid::parse_str(&row.get::<_, String>("template_id")?).unwrap_or_default(),
        name: row.get("name")?,
        symbols: serde_json::from_str(&symbols_raw).unwrap_or_default(),
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .map(|s| s.parse().unwrap_or_else(|_| Utc::now())),
        version: row.get("version")?,
    })
}

fn row_to_entry(row: &Row) -> rusqlite::Result<WatchlistEntry> {
    Ok(WatchlistEntry {
        watchlist_id: Uuid::parse_str(&row.get::<_, String>("watchlist_id")?).unwrap_or_default(),
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        symbol: row.get("symbol")?,
        lot_size: row.get::<_, Option<String>>("lot_size")?.and_then(|s| s.parse().ok()),
        tick_size: row.get::<_, Option<String>>("tick_size")?.and_then(|s| s.parse().ok()),
        is_custom: row.get::<_, i64>("is_custom")? != 0,
        enabled: row.get::<_, i64>("enabled")? != 0,
        last_synced_at: row
            .get::<_, Option<String>>("last_synced_at")?
            .and_then(|s| s.parse().ok()),
        last_price: row.get::<_, Option<String>>("last_price")?.and_then(|s| s.parse().ok()),
        last_tick_time: row
            .get::<_, Option<String>>("last_tick_time")?
            .and_then(|s| s.parse().ok()),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .map(|s| s.parse().unwrap_or_else(|_| Utc::now())),
        version: row.get("version")?,
    })
}

impl Store {
    pub fn create_template(&self, name: &str, symbols: Vec<String>) -> Result<WatchlistTemplate, AppError> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let symbols_json = serde_json::to_string(&symbols).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO watchlist_templates (template_id, name, symbols_json, created_at, updated_at, deleted_at, version)
             VALUES (?1, ?2, ?3, ?4, ?4, NULL, 1)",
            params![id.to_string(), name, symbols_json, now],
        )?;
        conn.query_row(
            "SELECT * FROM watchlist_templates WHERE template_id = ?1 AND deleted_at IS NULL",
            params![id.to_string()],
            row_to_template,
        )
        .map_err(AppError::from)
    }

    pub fn list_templates(&self) -> Result<Vec<WatchlistTemplate>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM watchlist_templates WHERE deleted_at IS NULL")?;
        let rows = stmt.query_map([], row_to_template)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Turns a template's symbol list on as a named Selected list (L2).
    pub fn select_template(&self, template_id: Uuid, name: &str) -> Result<WatchlistSelected, AppError> {
        let conn = self.conn.lock();
        let template = conn
            .query_row(
                "SELECT * FROM watchlist_templates WHERE template_id = ?1 AND deleted_at IS NULL",
                params![template_id.to_string()],
                row_to_template,
            )
            .map_err(AppError::from)?;
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let symbols_json = serde_json::to_string(&template.symbols).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO watchlist_selected (selected_id, template_id, name, symbols_json, enabled, created_at, updated_at, deleted_at, version)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, NULL, 1)",
            params![id.to_string(), template_id.to_string(), name, symbols_json, now],
        )?;
        conn.query_row(
            "SELECT * FROM watchlist_selected WHERE selected_id = ?1 AND deleted_at IS NULL",
            params![id.to_string()],
            row_to_selected,
        )
        .map_err(AppError::from)
    }

    pub fn set_selected_enabled(&self, selected_id: Uuid, enabled: bool) -> Result<WatchlistSelected, AppError> {
        let conn = self.conn.lock();
        let id = selected_id.to_string();
        let version = current_version(&conn, "watchlist_selected", "selected_id", &id)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE watchlist_selected SET deleted_at = ?1 WHERE selected_id = ?2 AND version = ?3 AND deleted_at IS NULL",
            params![now, id, version],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("watchlist_selected({id}, version={version})")));
        }
        conn.execute(
            "INSERT INTO watchlist_selected (selected_id, template_id, name, symbols_json, enabled, created_at, updated_at, deleted_at, version)
             SELECT selected_id, template_id, name, symbols_json, ?1, created_at, ?2, NULL, ?3
             FROM watchlist_selected WHERE selected_id = ?4 AND version = ?5",
            params![enabled as i64, now, version + 1, id, version],
        )?;
        conn.query_row(
            "SELECT * FROM watchlist_selected WHERE selected_id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_selected,
        )
        .map_err(AppError::from)
    }

    /// L3 Default: the union of every enabled Selected list's symbols.
    pub fn default_watchlist_symbols(&self) -> Result<Vec<String>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbols_json FROM watchlist_selected WHERE enabled = 1 AND deleted_at IS NULL",
        )?;
        let rows: Vec<String> = stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?;
        let mut merged: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for raw in rows {
            let symbols: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            for s in symbols {
                if seen.insert(s.clone()) {
                    merged.push(s);
                }
            }
        }
        merged.sort();
        Ok(merged)
    }

    /// Syncs a user-broker's L4 watchlist to the current L3 default,
    /// inserting any missing symbol and disabling any non-custom row no
    /// longer in the default, but never touching a row with
    /// `is_custom = true` (spec §4.9: custom rows survive resync).
    pub fn sync_watchlist(&self, user_broker_id: Uuid) -> Result<u64, AppError> {
        let default_symbols = self.default_watchlist_symbols()?;
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let existing: Vec<(String, i64, bool, bool)> = {
            let mut stmt = conn.prepare(
                "SELECT symbol, version, is_custom, enabled FROM watchlist_entries
                 WHERE user_broker_id = ?1 AND deleted_at IS NULL",
            )?;
            let rows = stmt.query_map(params![user_broker_id.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0, row.get::<_, i64>(3)? != 0))
            })?
            .collect::<Result<_, _>>()?;
            rows
        };
        let existing_symbols: HashSet<&str> = existing.iter().map(|(s, _, _, _)| s.as_str()).collect();

        let mut changed = 0u64;
        for symbol in &default_symbols {
            if existing_symbols.contains(symbol.as_str()) {
                continue;
            }
            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO watchlist_entries (
                    watchlist_id, user_broker_id, symbol, lot_size, tick_size, is_custom, enabled,
                    last_synced_at, last_price, last_tick_time, created_at, updated_at, deleted_at, version
                ) VALUES (?1, ?2, ?3, NULL, NULL, 0, 1, ?4, NULL, NULL, ?4, ?4, NULL, 1)",
                params![id.to_string(), user_broker_id.to_string(), symbol, now],
            )?;
            changed += 1;
        }

        let default_set: HashSet<&str> = default_symbols.iter().map(|s| s.as_str()).collect();
        for (symbol, version, is_custom, enabled) in existing {
            if is_custom || default_set.contains(symbol.as_str()) {
                continue;
            }
            if !enabled {
                continue;
            }
            conn.execute(
                "UPDATE watchlist_entries SET deleted_at = ?1 WHERE user_broker_id = ?2 AND symbol = ?3 AND version = ?4 AND deleted_at IS NULL",
                params![now, user_broker_id.to_string(), symbol, version],
            )?;
            if conn.changes() == 0 {
                continue;
            }
            conn.execute(
                "INSERT INTO watchlist_entries (
                    watchlist_id, user_broker_id, symbol, lot_size, tick_size, is_custom, enabled,
                    last_synced_at, last_price, last_tick_time, created_at, updated_at, deleted_at, version
                ) SELECT watchlist_id, user_broker_id, symbol, lot_size, tick_size, is_custom, 0,
                    ?1, last_price, last_tick_time, created_at, ?1, NULL, ?2
                  FROM watchlist_entries WHERE user_broker_id = ?3 AND symbol = ?4 AND version = ?5",
                params![now, version + 1, user_broker_id.to_string(), symbol, version],
            )?;
            changed += 1;
        }
        Ok(changed)
    }

    pub fn add_custom_entry(&self, user_broker_id: Uuid, symbol: &str) -> Result<WatchlistEntry, AppError> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO watchlist_entries (
                watchlist_id, user_broker_id, symbol, lot_size, tick_size, is_custom, enabled,
                last_synced_at, last_price, last_tick_time, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, NULL, NULL, 1, 1, NULL, NULL, NULL, ?4, ?4, NULL, 1)",
            params![id.to_string(), user_broker_id.to_string(), symbol, now],
        )?;
        conn.query_row(
            "SELECT * FROM watchlist_entries WHERE watchlist_id = ?1 AND deleted_at IS NULL",
            params![id.to_string()],
            row_to_entry,
        )
        .map_err(AppError::from)
    }

    pub fn list_watchlist(&self, user_broker_id: Uuid) -> Result<Vec<WatchlistEntry>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM watchlist_entries WHERE user_broker_id = ?1 AND deleted_at IS NULL ORDER BY symbol ASC",
        )?;
        let rows = stmt.query_map(params![user_broker_id.to_string()], row_to_entry)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user_broker(store: &Store) -> Uuid {
        let conn = store.conn.lock();
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO user_brokers (user_broker_id, user_id, broker_id, role, credentials, connected, last_connected, connection_error, risk_policy_json, status, enabled, created_at, updated_at, deleted_at, version)
             VALUES (?1, ?2, ?3, 'EXEC', 'x', 0, NULL, NULL, '{}', 'ACTIVE', 1, ?4, ?4, NULL, 1)",
            params![id.to_string(), Uuid::new_v4().to_string(), Uuid::new_v4().to_string(), now],
        ).unwrap();
        id
    }

    #[test]
    fn custom_entry_survives_resync() {
        let store = Store::open_in_memory().unwrap();
        let ub = make_user_broker(&store);
        let template = store.create_template("core", vec!["TCS".to_string()]).unwrap();
        store.select_template(template.template_id, "core-selected").unwrap();
        store.sync_watchlist(ub).unwrap();
        store.add_custom_entry(ub, "CUSTOMSTOCK").unwrap();

        store.sync_watchlist(ub).unwrap();

        let entries = store.list_watchlist(ub).unwrap();
        assert!(entries.iter().any(|e| e.symbol == "CUSTOMSTOCK" && e.is_custom));
        assert!(entries.iter().any(|e| e.symbol == "TCS"));
    }
}
