//! Config Store (spec §4.10): one global row plus per-`(symbol,
//! user_broker_id)` overrides, resolved field-wise by
//! [`MtfGlobalConfig::resolve_effective`]. Writing either invalidates the
//! signals that were computed under the old numbers (Open Question #2/#3).

use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::Store;
use crate::error::AppError;
use crate::models::mtf_config::{MtfGlobalConfig, MtfSymbolConfig, GLOBAL_CONFIG_ID};

fn row_to_global(row: &Row) -> rusqlite::Result<MtfGlobalConfig> {
    let raw: String = row.get("config_json")?;
    let mut cfg: MtfGlobalConfig = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    cfg.version = row.get("version")?;
    cfg.updated_at = row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now());
    Ok(cfg)
}

fn row_to_symbol(row: &Row) -> rusqlite::Result<MtfSymbolConfig> {
    let raw: String = row.get("config_json")?;
    let mut cfg: MtfSymbolConfig = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    cfg.symbol = row.get("symbol")?;
    cfg.user_broker_id = Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default();
    cfg.version = row.get("version")?;
    cfg.updated_at = row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now());
    Ok(cfg)
}

impl Store {
    /// Reads the singleton global config, seeding it with defaults on
    /// first access.
    pub fn get_global_config(&self) -> Result<MtfGlobalConfig, AppError> {
        let conn = self.conn.lock();
        let existing = conn
            .query_row(
                "SELECT * FROM mtf_global_config WHERE id = ?1",
                params![GLOBAL_CONFIG_ID],
                row_to_global,
            )
            .ok();
        if let Some(cfg) = existing {
            return Ok(cfg);
        }
        let cfg = MtfGlobalConfig::default();
        let now = Utc::now().to_rfc3339();
        let config_json = serde_json::to_string(&cfg).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO mtf_global_config (id, config_json, updated_at, version) VALUES (?1, ?2, ?3, 1)",
            params![GLOBAL_CONFIG_ID, config_json, now],
        )?;
        Ok(cfg)
    }

    /// Overwrites the global config and marks every open signal STALE
    /// (spec §4.10, Open Question #3: a global write has system-wide
    /// blast radius since every symbol can read from it).
    pub fn set_global_config(&self, mut cfg: MtfGlobalConfig) -> Result<MtfGlobalConfig, AppError> {
        let conn = self.conn.lock();
        let prior_version: i64 = conn
            .query_row(
                "SELECT version FROM mtf_global_config WHERE id = ?1",
                params![GLOBAL_CONFIG_ID],
                |row| row.get(0),
            )
            .unwrap_or(0);
        cfg.version = prior_version + 1;
        cfg.updated_at = Utc::now();
        let config_json = serde_json::to_string(&cfg).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO mtf_global_config (id, config_json, updated_at, version) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET config_json = excluded.config_json, updated_at = excluded.updated_at, version = excluded.version",
            params![GLOBAL_CONFIG_ID, config_json, cfg.updated_at.to_rfc3339(), cfg.version],
        )?;
        drop(conn);
        self.mark_stale_all(&[])?;
        Ok(cfg)
    }

    pub fn get_symbol_override(
        &self,
        symbol: &str,
        user_broker_id: Uuid,
    ) -> Result<Option<MtfSymbolConfig>, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM mtf_symbol_configs WHERE symbol = ?1 AND user_broker_id = ?2",
            params![symbol, user_broker_id.to_string()],
            row_to_symbol,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::from(other)),
        })
    }

    /// Overwrites one symbol's override and marks that symbol's open
    /// signals STALE (spec §4.10, Open Question #3: narrower blast radius
    /// than a global write).
    pub fn set_symbol_override(&self, mut cfg: MtfSymbolConfig) -> Result<MtfSymbolConfig, AppError> {
        let conn = self.conn.lock();
        let prior_version: i64 = conn
            .query_row(
                "SELECT version FROM mtf_symbol_configs WHERE symbol = ?1 AND user_broker_id = ?2",
                params![cfg.symbol, cfg.user_broker_id.to_string()],
                |row| row.get(0),
            )
            .unwrap_or(0);
        cfg.version = prior_version + 1;
        cfg.updated_at = Utc::now();
        let config_json = serde_json::to_string(&cfg).map_err(|e| AppError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO mtf_symbol_configs (symbol, user_broker_id, config_json, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(symbol, user_broker_id) DO UPDATE SET
                config_json = excluded.config_json, updated_at = excluded.updated_at, version = excluded.version",
            params![cfg.symbol, cfg.user_broker_id.to_string(), config_json, cfg.updated_at.to_rfc3339(), cfg.version],
        )?;
        let symbol = cfg.symbol.clone();
        drop(conn);
        self.mark_stale_symbol(&symbol)?;
        Ok(cfg)
    }

    /// Field-wise merge of the global config with a symbol override, or
    /// the global config alone if no override exists.
    pub fn resolve_effective_config(
        &self,
        symbol: &str,
        user_broker_id: Uuid,
    ) -> Result<crate::models::mtf_config::EffectiveMtfConfig, AppError> {
        let global = self.get_global_config()?;
        let over = self.get_symbol_override(symbol, user_broker_id)?;
        Ok(global.resolve_effective(over.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_global_field_wise() {
        let store = Store::open_in_memory().unwrap();
        let global = store.get_global_config().unwrap();
        let ub = Uuid::new_v4();
        let mut ov = MtfSymbolConfig {
            symbol: "TCS".to_string(),
            user_broker_id: ub,
            ..Default::default()
        };
        ov.kelly_fraction = Some(rust_decimal::Decimal::new(40, 2));
        store.set_symbol_override(ov).unwrap();

        let effective = store.resolve_effective_config("TCS", ub).unwrap();
        assert_eq!(effective.kelly_fraction, rust_decimal::Decimal::new(40, 2));
        assert_eq!(effective.confluence_threshold, global.confluence_threshold);
    }
}
