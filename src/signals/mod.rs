//! Signal Manager (spec §4.3): the ACTIVE -> PUBLISHED -> {EXPIRED, STALE,
//! SUPERSEDED, CANCELLED} lifecycle, keyed for dedupe on
//! `(symbol, confluence_type, signal_day, effective_floor, effective_ceiling)`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{current_version, Store};
use crate::delivery;
use crate::error::AppError;
use crate::events::append_tx;
use crate::models::event::NewTradeEvent;
use crate::models::signal::{Direction, Signal, SignalStatus, SignalUpsert, TimeframeZones};
use crate::time_util::signal_day;

fn row_to_signal(row: &Row) -> rusqlite::Result<Signal> {
    let zones_raw: String = row.get("zones_json")?;
    let tags_raw: String = row.get("tags_json")?;
    let direction_raw: String = row.get("direction")?;
    let status_raw: String = row.get("status")?;
    let signal_day_raw: String = row.get("signal_day")?;
    Ok(Signal {
        signal_id: Uuid::parse_str(&row.get::<_, String>("signal_id")?).unwrap_or_default(),
        symbol: row.get("symbol")?,
        confluence_type: row.get("confluence_type")?,
        signal_day: signal_day_raw.parse::<NaiveDate>().unwrap_or_default(),
        direction: Direction::from_str(&direction_raw),
        signal_type: row.get("signal_type")?,
        zones: serde_json::from_str::<TimeframeZones>(&zones_raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        p_win: parse_decimal(row, "p_win")?,
        p_fill: parse_decimal(row, "p_fill")?,
        kelly: parse_decimal(row, "kelly")?,
        reference_price: parse_decimal(row, "reference_price")?,
        entry_band: crate::models::signal::ZoneBand {
            low: parse_decimal(row, "entry_band_low")?,
            high: parse_decimal(row, "entry_band_high")?,
        },
        effective_floor: parse_decimal(row, "effective_floor")?,
        effective_ceiling: parse_decimal(row, "effective_ceiling")?,
        confidence: parse_decimal(row, "confidence")?,
        tags: serde_json::from_str(&tags_raw).unwrap_or_default(),
        generated_at: parse_dt(row, "generated_at")?,
        expires_at: parse_dt(row, "expires_at")?,
        status: SignalStatus::from_str(&status_raw),
        created_at: parse_dt(row, "created_at")?,
        updated_at: parse_dt(row, "updated_at")?,
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .map(|s| s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())),
        version: row.get("version")?,
    })
}

fn parse_decimal(row: &Row, idx: &str) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_dt(row: &Row, idx: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: chrono::ParseError| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

impl Store {
    /// Dedupe-upsert keyed by `(symbol, confluence_type, signal_day,
    /// effective_floor, effective_ceiling)` (spec §4.3). An existing ACTIVE
    /// or PUBLISHED row matching the key is refreshed in place (new
    /// version, same id); otherwise a fresh ACTIVE signal is created.
    pub fn signal_upsert(&self, mut input: SignalUpsert, tz_name: &str) -> Result<Signal, AppError> {
        let conn = self.conn.lock();
        let day = signal_day(input.generated_at, tz_name);
        let now = Utc::now();

        // Dedupe key and storage both round half-up at the store layer
        // (spec §8, §9), not just at the HTTP boundary.
        input.effective_floor = crate::time_util::round_price_half_up(input.effective_floor);
        input.effective_ceiling = crate::time_util::round_price_half_up(input.effective_ceiling);

        let existing: Option<(String, i64, String)> = conn
            .query_row(
                "SELECT signal_id, version, status FROM signals
                 WHERE symbol = ?1 AND confluence_type = ?2 AND signal_day = ?3
                   AND effective_floor = ?4 AND effective_ceiling = ?5
                   AND deleted_at IS NULL",
                params![
                    input.symbol,
                    input.confluence_type,
                    day.to_string(),
                    input.effective_floor.to_string(),
                    input.effective_ceiling.to_string(),
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional_app()?;

        let zones_json = serde_json::to_string(&input.zones)
            .map_err(|e| AppError::Internal(format!("zones serialize: {e}")))?;
        let tags_json = serde_json::to_string(&input.tags)
            .map_err(|e| AppError::Internal(format!("tags serialize: {e}")))?;

        let (signal_id, new_version) = match existing {
            Some((id, version, status)) if !SignalStatus::from_str(&status).is_terminal() => {
                conn.execute(
                    "UPDATE signals SET deleted_at = ?1 WHERE signal_id = ?2 AND version = ?3 AND deleted_at IS NULL",
                    params![now.to_rfc3339(), id, version],
                )?;
                (id, version + 1)
            }
            _ => (Uuid::new_v4().to_string(), 1),
        };

        conn.execute(
            "INSERT INTO signals (
                signal_id, symbol, confluence_type, signal_day, direction, signal_type,
                zones_json, p_win, p_fill, kelly, reference_price,
                entry_band_low, entry_band_high, effective_floor, effective_ceiling,
                confidence, tags_json, generated_at, expires_at, status,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,'ACTIVE',?20,?21,NULL,?22)",
            params![
                signal_id,
                input.symbol,
                input.confluence_type,
                day.to_string(),
                input.direction.as_str(),
                input.signal_type,
                zones_json,
                input.p_win.to_string(),
                input.p_fill.to_string(),
                input.kelly.to_string(),
                input.reference_price.to_string(),
                input.entry_band.low.to_string(),
                input.entry_band.high.to_string(),
                input.effective_floor.to_string(),
                input.effective_ceiling.to_string(),
                input.confidence.to_string(),
                tags_json,
                input.generated_at.to_rfc3339(),
                input.expires_at.to_rfc3339(),
                now.to_rfc3339(),
                now.to_rfc3339(),
                new_version,
            ],
        )?;

        append_tx(
            &conn,
            &NewTradeEvent::global("SIGNAL_UPSERTED", "system")
                .with_signal(Uuid::parse_str(&signal_id).unwrap_or_default())
                .with_payload(serde_json::json!({"symbol": input.symbol, "version": new_version})),
        )?;

        self.find_current_signal_tx(&conn, &signal_id)
    }

    fn find_current_signal_tx(&self, conn: &Connection, signal_id: &str) -> Result<Signal, AppError> {
        conn.query_row(
            "SELECT * FROM signals WHERE signal_id = ?1 AND deleted_at IS NULL",
            params![signal_id],
            row_to_signal,
        )
        .map_err(AppError::from)
    }

    pub fn find_current_signal(&self, signal_id: Uuid) -> Result<Signal, AppError> {
        let conn = self.conn.lock();
        self.find_current_signal_tx(&conn, &signal_id.to_string())
    }

    pub fn find_signal_versions(&self, signal_id: Uuid) -> Result<Vec<Signal>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM signals WHERE signal_id = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![signal_id.to_string()], row_to_signal)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Transitions a signal's status, cascading to its deliveries per
    /// Open Question #3: EXPIRED/STALE expire non-terminal deliveries,
    /// CANCELLED/SUPERSEDED cancel them.
    pub fn update_signal_status(&self, signal_id: Uuid, new_status: SignalStatus) -> Result<Signal, AppError> {
        let conn = self.conn.lock();
        let id = signal_id.to_string();
        let version = current_version(&conn, "signals", "signal_id", &id)?;
        let now = Utc::now();

        conn.execute(
            "UPDATE signals SET deleted_at = ?1 WHERE signal_id = ?2 AND version = ?3 AND deleted_at IS NULL",
            params![now.to_rfc3339(), id, version],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("signals({id}, version={version})")));
        }

        conn.execute(
            "INSERT INTO signals SELECT
                signal_id, symbol, confluence_type, signal_day, direction, signal_type,
                zones_json, p_win, p_fill, kelly, reference_price,
                entry_band_low, entry_band_high, effective_floor, effective_ceiling,
                confidence, tags_json, generated_at, expires_at, ?1,
                created_at, ?2, NULL, ?3
             FROM signals WHERE signal_id = ?4 AND version = ?5",
            params![new_status.as_str(), now.to_rfc3339(), version + 1, id, version],
        )?;

        match new_status {
            SignalStatus::Expired | SignalStatus::Stale => {
                delivery::expire_all_for_signal_tx(&conn, signal_id)?;
            }
            SignalStatus::Cancelled | SignalStatus::Superseded => {
                delivery::cancel_all_for_signal_tx(&conn, signal_id)?;
            }
            _ => {}
        }

        append_tx(
            &conn,
            &NewTradeEvent::global("SIGNAL_STATUS_CHANGED", "system")
                .with_signal(signal_id)
                .with_payload(serde_json::json!({"status": new_status.as_str()})),
        )?;

        self.find_current_signal_tx(&conn, &id)
    }

    /// Marks every non-terminal signal STALE, except those named in
    /// `exclude` (spec §4.3; SPEC_FULL.md Open Question #2: the exclusion
    /// list is a standing allowlist, not a one-shot parameter).
    pub fn mark_stale_all(&self, exclude_signal_ids: &[Uuid]) -> Result<u64, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let excluded: Vec<String> = exclude_signal_ids.iter().map(|u| u.to_string()).collect();
        let placeholders = excluded.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT signal_id, version FROM signals
             WHERE deleted_at IS NULL AND status IN ('ACTIVE', 'PUBLISHED')
               AND signal_id NOT IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(rusqlite::params_from_iter(excluded.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut count = 0u64;
        for (id, version) in rows {
            conn.execute(
                "UPDATE signals SET deleted_at = ?1 WHERE signal_id = ?2 AND version = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), id, version],
            )?;
            if conn.changes() == 0 {
                continue;
            }
            conn.execute(
                "INSERT INTO signals SELECT
                    signal_id, symbol, confluence_type, signal_day, direction, signal_type,
                    zones_json, p_win, p_fill, kelly, reference_price,
                    entry_band_low, entry_band_high, effective_floor, effective_ceiling,
                    confidence, tags_json, generated_at, expires_at, 'STALE',
                    created_at, ?1, NULL, ?2
                 FROM signals WHERE signal_id = ?3 AND version = ?4",
                params![now.to_rfc3339(), version + 1, id, version],
            )?;
            delivery::expire_all_for_signal_tx(&conn, Uuid::parse_str(&id).unwrap_or_default())?;
            count += 1;
        }
        Ok(count)
    }

    /// Same as [`Store::mark_stale_all`] but scoped to one symbol (spec
    /// §4.10: an `MtfSymbolConfig` write invalidates only that symbol's
    /// open signals).
    pub fn mark_stale_symbol(&self, symbol: &str) -> Result<u64, AppError> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let mut stmt = conn.prepare(
            "SELECT signal_id, version FROM signals
             WHERE deleted_at IS NULL AND status IN ('ACTIVE', 'PUBLISHED') AND symbol = ?1",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map(params![symbol], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut count = 0u64;
        for (id, version) in rows {
            conn.execute(
                "UPDATE signals SET deleted_at = ?1 WHERE signal_id = ?2 AND version = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), id, version],
            )?;
            if conn.changes() == 0 {
                continue;
            }
            conn.execute(
                "INSERT INTO signals SELECT
                    signal_id, symbol, confluence_type, signal_day, direction, signal_type,
                    zones_json, p_win, p_fill, kelly, reference_price,
                    entry_band_low, entry_band_high, effective_floor, effective_ceiling,
                    confidence, tags_json, generated_at, expires_at, 'STALE',
                    created_at, ?1, NULL, ?2
                 FROM signals WHERE signal_id = ?3 AND version = ?4",
                params![now.to_rfc3339(), version + 1, id, version],
            )?;
            delivery::expire_all_for_signal_tx(&conn, Uuid::parse_str(&id).unwrap_or_default())?;
            count += 1;
        }
        Ok(count)
    }

    /// Signals still non-terminal whose `expires_at` falls within
    /// `lookahead` of now (feeds the expiry scheduler background task).
    pub fn find_expiring_soon(&self, lookahead: chrono::Duration) -> Result<Vec<Signal>, AppError> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() + lookahead).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT * FROM signals
             WHERE deleted_at IS NULL AND status IN ('ACTIVE', 'PUBLISHED') AND expires_at <= ?1
             ORDER BY expires_at ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], row_to_signal)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

trait OptionalAppResult<T> {
    fn optional_app(self) -> Result<Option<T>, AppError>;
}

impl<T> OptionalAppResult<T> for rusqlite::Result<T> {
    fn optional_app(self) -> Result<Option<T>, AppError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signal::ZoneBand;
    use rust_decimal_macros::dec;

    fn sample_upsert(symbol: &str, floor: Decimal, ceiling: Decimal) -> SignalUpsert {
        let now = Utc::now();
        SignalUpsert {
            symbol: symbol.to_string(),
            confluence_type: "HTF_ITF_LTF".to_string(),
            direction: Direction::Long,
            signal_type: "BUY_ZONE".to_string(),
            zones: TimeframeZones {
                htf: ZoneBand { low: dec!(100), high: dec!(110) },
                itf: ZoneBand { low: dec!(101), high: dec!(109) },
                ltf: ZoneBand { low: dec!(102), high: dec!(108) },
            },
            p_win: dec!(0.6),
            p_fill: dec!(0.8),
            kelly: dec!(0.1),
            reference_price: dec!(105),
            entry_band: ZoneBand { low: dec!(103), high: dec!(107) },
            effective_floor: floor,
            effective_ceiling: ceiling,
            confidence: dec!(0.75),
            tags: vec!["momentum".to_string()],
            generated_at: now,
            expires_at: now + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn upsert_dedupes_on_key() {
        let store = Store::open_in_memory().unwrap();
        let s1 = store
            .signal_upsert(sample_upsert("RELIANCE", dec!(100.00), dec!(110.00)), "UTC")
            .unwrap();
        let s2 = store
            .signal_upsert(sample_upsert("RELIANCE", dec!(100.00), dec!(110.00)), "UTC")
            .unwrap();
        assert_eq!(s1.signal_id, s2.signal_id);
        assert_eq!(s2.version, 2);
    }

    #[test]
    fn upsert_distinct_key_creates_new_signal() {
        let store = Store::open_in_memory().unwrap();
        let s1 = store
            .signal_upsert(sample_upsert("RELIANCE", dec!(100.00), dec!(110.00)), "UTC")
            .unwrap();
        let s2 = store
            .signal_upsert(sample_upsert("RELIANCE", dec!(200.00), dec!(210.00)), "UTC")
            .unwrap();
        assert_ne!(s1.signal_id, s2.signal_id);
    }

    #[test]
    fn mark_stale_all_respects_exclusion_list() {
        let store = Store::open_in_memory().unwrap();
        let keep = store
            .signal_upsert(sample_upsert("TCS", dec!(100.00), dec!(110.00)), "UTC")
            .unwrap();
        let stale = store
            .signal_upsert(sample_upsert("INFY", dec!(100.00), dec!(110.00)), "UTC")
            .unwrap();
        let n = store.mark_stale_all(&[keep.signal_id]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.find_current_signal(keep.signal_id).unwrap().status, SignalStatus::Active);
        assert_eq!(store.find_current_signal(stale.signal_id).unwrap().status, SignalStatus::Stale);
    }
}
