//! Instrument Catalog (spec §4.8): a per-broker symbol/token/lot-size
//! reference table refreshed in bulk from the broker's daily instrument
//! dump, plus a ranked prefix search for the watchlist UI.

use chrono::Utc;
use rusqlite::{params, Row};
use rust_decimal::Decimal;

use crate::db::Store;
use crate::error::AppError;
use crate::models::instrument::Instrument;

fn row_to_instrument(row: &Row) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        broker_code: row.get("broker_code")?,
        exchange: row.get("exchange")?,
        trading_symbol: row.get("trading_symbol")?,
        name: row.get("name")?,
        instrument_type: row.get("instrument_type")?,
        token: row.get("token")?,
        lot_size: row
            .get::<_, String>("lot_size")?
            .parse()
            .unwrap_or(Decimal::ONE),
        tick_size: row
            .get::<_, String>("tick_size")?
            .parse()
            .unwrap_or(Decimal::new(5, 2)),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
    })
}

impl Store {
    /// Replaces the catalog for `broker_code` with `rows`, committing
    /// every 1000 rows (spec §4.8) so a multi-hundred-thousand-row daily
    /// dump doesn't hold one giant transaction open.
    pub fn bulk_upsert_instruments(&self, rows: &[Instrument]) -> Result<u64, AppError> {
        let mut conn = self.conn.lock();
        let mut total = 0u64;
        for chunk in rows.chunks(1000) {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for inst in chunk {
                tx.execute(
                    "INSERT INTO instruments (
                        broker_code, exchange, trading_symbol, name, instrument_type,
                        token, lot_size, tick_size, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                    ON CONFLICT(broker_code, exchange, trading_symbol) DO UPDATE SET
                        name = excluded.name,
                        instrument_type = excluded.instrument_type,
                        token = excluded.token,
                        lot_size = excluded.lot_size,
                        tick_size = excluded.tick_size,
                        updated_at = excluded.updated_at",
                    params![
                        inst.broker_code,
                        inst.exchange,
                        inst.trading_symbol,
                        inst.name,
                        inst.instrument_type,
                        inst.token,
                        inst.lot_size.to_string(),
                        inst.tick_size.to_string(),
                        now,
                    ],
                )?;
                total += 1;
            }
            tx.commit()?;
        }
        Ok(total)
    }

    pub fn find_instrument(
        &self,
        broker_code: &str,
        exchange: &str,
        trading_symbol: &str,
    ) -> Result<Instrument, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM instruments WHERE broker_code = ?1 AND exchange = ?2 AND trading_symbol = ?3",
            params![broker_code, exchange, trading_symbol],
            row_to_instrument,
        )
        .map_err(AppError::from)
    }

    /// Prefix matches rank 0, other substring matches rank 1, ties break
    /// lexicographically by `trading_symbol` (spec §4.8).
    pub fn search_instruments(&self, query: &str, limit: i64) -> Result<Vec<Instrument>, AppError> {
        let conn = self.conn.lock();
        let prefix_pattern = format!("{query}%");
        let contains_pattern = format!("%{query}%");
        let mut stmt = conn.prepare(
            "SELECT *, CASE WHEN trading_symbol LIKE ?1 THEN 0 ELSE 1 END AS rank
             FROM instruments
             WHERE trading_symbol LIKE ?2
             ORDER BY rank ASC, trading_symbol ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![prefix_pattern, contains_pattern, limit], row_to_instrument)?;
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
    use rust_decimal_macros::dec;

    fn sample(symbol: &str) -> Instrument {
        Instrument {
            broker_code: "ZERODHA".to_string(),
            exchange: "NSE".to_string(),
            trading_symbol: symbol.to_string(),
            name: symbol.to_string(),
            instrument_type: "EQ".to_string(),
            token: "1".to_string(),
            lot_size: dec!(1),
            tick_size: dec!(0.05),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn search_ranks_prefix_matches_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .bulk_upsert_instruments(&[sample("TATASTEEL"), sample("TCS"), sample("HDTCS")])
            .unwrap();
        let results = store.search_instruments("TCS", 10).unwrap();
        assert_eq!(results[0].trading_symbol, "TCS");
    }

    #[test]
    fn bulk_upsert_updates_existing_row() {
        let store = Store::open_in_memory().unwrap();
        store.bulk_upsert_instruments(&[sample("INFY")]).unwrap();
        let mut updated = sample("INFY");
        updated.lot_size = dec!(5);
        store.bulk_upsert_instruments(&[updated]).unwrap();
        let found = store.find_instrument("ZERODHA", "NSE", "INFY").unwrap();
        assert_eq!(found.lot_size, dec!(5));
    }
}
