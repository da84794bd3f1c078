//! Portfolio store (spec §3, §6 `/portfolios`): per-user named capital
//! pools, versioned like every other mutable entity (spec §4.1's
//! soft-delete-then-insert pattern, grounded on `signals/mod.rs`'s use of
//! [`current_version`]/[`soft_delete_current`]).

use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{current_version, soft_delete_current, Store};
use crate::error::AppError;
use crate::models::portfolio::{AllocationMode, Portfolio, PortfolioStatus};

fn row_to_portfolio(row: &Row) -> rusqlite::Result<Portfolio> {
    Ok(Portfolio {
        portfolio_id: Uuid::parse_str(&row.get::<_, String>("portfolio_id")?).unwrap_or_default(),
        user_id: Uuid::parse_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
        name: row.get("name")?,
        total_capital: row.get::<_, String>("total_capital")?.parse().unwrap_or_default(),
        reserved_capital: row.get::<_, String>("reserved_capital")?.parse().unwrap_or_default(),
        max_portfolio_log_loss: row.get::<_, String>("max_portfolio_log_loss")?.parse().unwrap_or_default(),
        max_symbol_weight: row.get::<_, String>("max_symbol_weight")?.parse().unwrap_or_default(),
        max_symbols: row.get("max_symbols")?,
        allocation_mode: AllocationMode::from_str(&row.get::<_, String>("allocation_mode")?),
        status: PortfolioStatus::from_str(&row.get::<_, String>("status")?),
        paused: row.get::<_, i64>("paused")? != 0,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row
            .get::<_, Option<String>>("deleted_at")?
            .and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

/// Fields accepted by [`Store::create_portfolio`]; id/status/paused/version
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct PortfolioInput {
    pub user_id: Uuid,
    pub name: String,
    pub total_capital: rust_decimal::Decimal,
    pub max_portfolio_log_loss: rust_decimal::Decimal,
    pub max_symbol_weight: rust_decimal::Decimal,
    pub max_symbols: i64,
    pub allocation_mode: AllocationMode,
}

impl Store {
    pub fn create_portfolio(&self, input: PortfolioInput) -> Result<Portfolio, AppError> {
        let conn = self.conn.lock();
        let portfolio_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO portfolios (
                portfolio_id, user_id, name, total_capital, reserved_capital,
                max_portfolio_log_loss, max_symbol_weight, max_symbols, allocation_mode,
                status, paused, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, '0', ?5, ?6, ?7, ?8, 'ACTIVE', 0, ?9, ?9, NULL, 1)",
            params![
                portfolio_id.to_string(),
                input.user_id.to_string(),
                input.name,
                input.total_capital.to_string(),
                input.max_portfolio_log_loss.to_string(),
                input.max_symbol_weight.to_string(),
                input.max_symbols,
                input.allocation_mode.as_str(),
                now,
            ],
        )?;
        conn.query_row(
            "SELECT * FROM portfolios WHERE portfolio_id = ?1 AND deleted_at IS NULL",
            params![portfolio_id.to_string()],
            row_to_portfolio,
        )
        .map_err(AppError::from)
    }

    pub fn find_portfolio(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM portfolios WHERE portfolio_id = ?1 AND deleted_at IS NULL",
            params![portfolio_id.to_string()],
            row_to_portfolio,
        )
        .map_err(AppError::from)
    }

    pub fn list_portfolios_for_user(&self, user_id: Uuid) -> Result<Vec<Portfolio>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM portfolios WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_portfolio)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Adjusts `reserved_capital` by `delta` (positive to reserve, negative
    /// to release), soft-deleting the old version and inserting the new one
    /// per the standard versioned-record pattern.
    pub fn adjust_reserved_capital(
        &self,
        portfolio_id: Uuid,
        delta: rust_decimal::Decimal,
    ) -> Result<Portfolio, AppError> {
        let conn = self.conn.lock();
        let id = portfolio_id.to_string();
        let version = current_version(&conn, "portfolios", "portfolio_id", &id)?;
        let current = conn.query_row(
            "SELECT * FROM portfolios WHERE portfolio_id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_portfolio,
        )?;
        let now = Utc::now().to_rfc3339();
        soft_delete_current(&conn, "portfolios", "portfolio_id", &id, version, &now)?;
        let new_reserved = (current.reserved_capital + delta).max(rust_decimal::Decimal::ZERO);
        conn.execute(
            "INSERT INTO portfolios (
                portfolio_id, user_id, name, total_capital, reserved_capital,
                max_portfolio_log_loss, max_symbol_weight, max_symbols, allocation_mode,
                status, paused, created_at, updated_at, deleted_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, ?14)",
            params![
                id,
                current.user_id.to_string(),
                current.name,
                current.total_capital.to_string(),
                new_reserved.to_string(),
                current.max_portfolio_log_loss.to_string(),
                current.max_symbol_weight.to_string(),
                current.max_symbols,
                current.allocation_mode.as_str(),
                current.status.as_str(),
                current.paused as i64,
                current.created_at.to_rfc3339(),
                now,
                version + 1,
            ],
        )?;
        conn.query_row(
            "SELECT * FROM portfolios WHERE portfolio_id = ?1 AND deleted_at IS NULL",
            params![id],
            row_to_portfolio,
        )
        .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_input(user_id: Uuid) -> PortfolioInput {
        PortfolioInput {
            user_id,
            name: "Main".to_string(),
            total_capital: dec!(100000),
            max_portfolio_log_loss: dec!(0.06),
            max_symbol_weight: dec!(0.25),
            max_symbols: 10,
            allocation_mode: AllocationMode::Kelly,
        }
    }

    #[test]
    fn create_and_fetch_portfolio() {
        let store = Store::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let created = store.create_portfolio(sample_input(user_id)).unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.available_capital(), dec!(100000));

        let fetched = store.find_portfolio(created.portfolio_id).unwrap();
        assert_eq!(fetched.name, "Main");
    }

    #[test]
    fn adjust_reserved_capital_bumps_version_and_clamps_at_zero() {
        let store = Store::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let created = store.create_portfolio(sample_input(user_id)).unwrap();

        let reserved = store.adjust_reserved_capital(created.portfolio_id, dec!(5000)).unwrap();
        assert_eq!(reserved.version, 2);
        assert_eq!(reserved.reserved_capital, dec!(5000));
        assert_eq!(reserved.available_capital(), dec!(95000));

        let released = store.adjust_reserved_capital(created.portfolio_id, dec!(-20000)).unwrap();
        assert_eq!(released.reserved_capital, rust_decimal::Decimal::ZERO);
    }

    #[test]
    fn list_portfolios_for_user_excludes_other_users() {
        let store = Store::open_in_memory().unwrap();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        store.create_portfolio(sample_input(user_a)).unwrap();
        store.create_portfolio(sample_input(user_b)).unwrap();

        let for_a = store.list_portfolios_for_user(user_a).unwrap();
        assert_eq!(for_a.len(), 1);
    }
}
