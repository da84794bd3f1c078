//! Entry Intent Pipeline (spec §4.5): consumed delivery -> validated,
//! sized, approved intent -> placed order -> reconciled trade. Each step
//! persists before the next begins so a crash mid-pipeline always leaves
//! a resumable intermediate state rather than a silently lost order.

use chrono::Utc;
use rusqlite::{params, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::broker::adapter::{BrokerAdapter, OrderRequest, OrderSide};
use crate::db::{current_version, Store};
use crate::error::{AppError, ValidationError};
use crate::events::append_tx;
use crate::intents::sizing::{self, SizingInputs};
use crate::models::event::NewTradeEvent;
use crate::models::intent::{IntentStatus, OrderType, TradeIntent};
use crate::models::signal::Signal;
use crate::models::trade::{Trade, TradeStatus, TradeUpsert};

/// Everything the pipeline needs to size and validate one entry, beyond
/// what's already on the consumed `Signal`/delivery (spec §4.5).
#[derive(Debug, Clone)]
pub struct TradeIntentInput {
    pub delivery_id: Uuid,
    pub user_broker_id: Uuid,
    pub signal: Signal,
    pub available_capital: Decimal,
    pub kelly_fraction: Decimal,
    pub position_log_loss_cap: Decimal,
    pub per_trade_cap: Decimal,
    pub portfolio_exposure_before: Decimal,
    pub max_exposure: Decimal,
    pub product_type: String,
    pub allowed_product_types: Vec<String>,
    pub block_symbols: Vec<String>,
    /// Current ATR / its recent average, for the velocity-throttle regime
    /// bucket (spec §3, §4.5 step 3).
    pub atr_ratio: Decimal,
}

fn row_to_intent(row: &Row) -> rusqlite::Result<TradeIntent> {
    let errs_raw: String = row.get("validation_errors_json")?;
    let order_type_raw: String = row.get("order_type")?;
    let status_raw: String = row.get("status")?;
    Ok(TradeIntent {
        intent_id: Uuid::parse_str(&row.get::<_, String>("intent_id")?).unwrap_or_default(),
        signal_id: Uuid::parse_str(&row.get::<_, String>("signal_id")?).unwrap_or_default(),
        user_broker_id: Uuid::parse_str(&row.get::<_, String>("user_broker_id")?).unwrap_or_default(),
        delivery_id: Uuid::parse_str(&row.get::<_, String>("delivery_id")?).unwrap_or_default(),
        validation_passed: row.get::<_, i64>("validation_passed")? != 0,
        validation_errors: serde_json::from_str::<Vec<ValidationError>>(&errs_raw).unwrap_or_default(),
        calculated_qty: row.get::<_, String>("calculated_qty")?.parse().unwrap_or(Decimal::ZERO),
        calculated_value: row.get::<_, String>("calculated_value")?.parse().unwrap_or(Decimal::ZERO),
        order_type: OrderType::from_str(&order_type_raw),
        limit_price: row.get::<_, Option<String>>("limit_price")?.and_then(|s| s.parse().ok()),
        product_type: row.get("product_type")?,
        log_impact: row.get::<_, String>("log_impact")?.parse().unwrap_or(Decimal::ZERO),
        portfolio_exposure_after: row.get::<_, String>("portfolio_exposure_after")?.parse().unwrap_or(Decimal::ZERO),
        status: IntentStatus::from_str(&status_raw),
        order_id: row.get("order_id")?,
        trade_id: row.get::<_, Option<String>>("trade_id")?.and_then(|s| Uuid::parse_str(&s).ok()),
        error_code: row.get("error_code")?,
        error_message: row.get("error_message")?,
        placed_at: row.get::<_, Option<String>>("placed_at")?.and_then(|s| s.parse().ok()),
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

pub(crate) fn row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
    let status_raw: String = row.get("status")?;
    let zones_raw: Option<String> = row.get("zones_json").ok();
    Ok(Trade {
        trade_id: Uuid::parse_str(&row.get::<_, String>("trade_id")?).unwrap_or_default(),
        intent_id: Uuid::parse_str(&row.get::<_, String>("intent_id")?).unwrap_or_default(),
        signal_id: row.get::<_, Option<String>>("signal_id")?.and_then(|s| Uuid::parse_str(&s).ok()),
        user_broker_id: row.get::<_, Option<String>>("user_broker_id")?.and_then(|s| Uuid::parse_str(&s).ok()),
        status: TradeStatus::from_str(&status_raw),
        quantity: row.get::<_, Option<String>>("quantity")?.and_then(|s| s.parse().ok()),
        entry_price: row.get::<_, Option<String>>("entry_price")?.and_then(|s| s.parse().ok()),
        entry_value: row.get::<_, Option<String>>("entry_value")?.and_then(|s| s.parse().ok()),
        product_type: row.get("product_type")?,
        zones: zones_raw.and_then(|s| serde_json::from_str(&s).ok()),
        entry_band_low: row.get::<_, Option<String>>("entry_band_low")?.and_then(|s| s.parse().ok()),
        entry_band_high: row.get::<_, Option<String>>("entry_band_high")?.and_then(|s| s.parse().ok()),
        log_impact: row.get::<_, Option<String>>("log_impact")?.and_then(|s| s.parse().ok()),
        target_price: row.get::<_, Option<String>>("target_price")?.and_then(|s| s.parse().ok()),
        stop_price: row.get::<_, Option<String>>("stop_price")?.and_then(|s| s.parse().ok()),
        current_price: row.get::<_, Option<String>>("current_price")?.and_then(|s| s.parse().ok()),
        current_log_return: row.get::<_, Option<String>>("current_log_return")?.and_then(|s| s.parse().ok()),
        unrealized_pnl: row.get::<_, Option<String>>("unrealized_pnl")?.and_then(|s| s.parse().ok()),
        trailing_stop: crate::models::trade::TrailingStop {
            active: row.get::<_, i64>("trailing_stop_active")? != 0,
            highest_price: row.get::<_, Option<String>>("trailing_stop_highest_price")?.and_then(|s| s.parse().ok()),
            stop_price: row.get::<_, Option<String>>("trailing_stop_stop_price")?.and_then(|s| s.parse().ok()),
        },
        exit_price: row.get::<_, Option<String>>("exit_price")?.and_then(|s| s.parse().ok()),
        exit_at: row.get::<_, Option<String>>("exit_at")?.and_then(|s| s.parse().ok()),
        exit_trigger: row.get("exit_trigger")?,
        exit_order_id: row.get("exit_order_id")?,
        realized_pnl: row.get::<_, Option<String>>("realized_pnl")?.and_then(|s| s.parse().ok()),
        realized_log_return: row.get::<_, Option<String>>("realized_log_return")?.and_then(|s| s.parse().ok()),
        holding_days: row.get("holding_days")?,
        broker_order_id: row.get("broker_order_id")?,
        broker_trade_id: row.get("broker_trade_id")?,
        client_order_id: row.get("client_order_id")?,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        deleted_at: row.get::<_, Option<String>>("deleted_at")?.and_then(|s| s.parse().ok()),
        version: row.get("version")?,
    })
}

impl Store {
    /// Step 1: creates the intent row PENDING, with validation results
    /// and sizing already computed (the caller does the pure math; this
    /// just persists it) — step 2 onward is all in this one insert so a
    /// reader never observes "validated but not yet sized" (spec §4.5).
    pub fn create_trade_intent(&self, input: &TradeIntentInput) -> Result<TradeIntent, AppError> {
        let mut errors = Vec::new();
        if input.block_symbols.iter().any(|s| s == &input.signal.symbol) {
            errors.push(ValidationError {
                code: "SYMBOL_BLOCKED".to_string(),
                field: "symbol".to_string(),
                message: format!("{} is on the block list", input.signal.symbol),
            });
        }
        if !input.allowed_product_types.is_empty()
            && !input.allowed_product_types.contains(&input.product_type)
        {
            errors.push(ValidationError {
                code: "PRODUCT_TYPE_NOT_ALLOWED".to_string(),
                field: "product_type".to_string(),
                message: format!("{} is not an allowed product type", input.product_type),
            });
        }

        let effective_config = self.resolve_effective_config(&input.signal.symbol, input.user_broker_id)?;

        let sizing = sizing::size_position(SizingInputs {
            available_capital: input.available_capital,
            reference_price: input.signal.reference_price,
            kelly: input.signal.kelly,
            kelly_fraction: input.kelly_fraction,
            position_log_loss_cap: input.position_log_loss_cap,
            per_trade_cap: input.per_trade_cap,
        });

        let velocity_regime = sizing::classify_velocity(
            input.atr_ratio,
            effective_config.velocity_throttle_low,
            effective_config.velocity_throttle_high,
        );
        let quantity = sizing::apply_velocity_throttle(sizing.quantity, velocity_regime);
        let notional_value = quantity * input.signal.reference_price;
        let log_impact = if sizing.quantity > Decimal::ZERO {
            sizing.log_impact * (quantity / sizing.quantity)
        } else {
            Decimal::ZERO
        };

        let utility_win = quantity * (input.signal.effective_ceiling - input.signal.reference_price);
        let utility_loss = quantity * (input.signal.reference_price - input.signal.effective_floor);
        let gate_passes = sizing::passes_utility_asymmetry(
            input.signal.p_win,
            utility_win,
            utility_loss,
            effective_config.utility_asymmetry_ratio,
        );
        if !gate_passes {
            errors.push(ValidationError {
                code: "UTILITY_ASYMMETRY_REJECTED".to_string(),
                field: "calculated_qty".to_string(),
                message: "downside utility dominates the upside for this trade".to_string(),
            });
        }

        let exposure_after = input.portfolio_exposure_before + notional_value;
        if exposure_after > input.max_exposure {
            errors.push(ValidationError {
                code: "EXPOSURE_CAP_EXCEEDED".to_string(),
                field: "portfolio_exposure_after".to_string(),
                message: "trade would exceed the portfolio's max exposure".to_string(),
            });
        }
        if quantity <= Decimal::ZERO {
            errors.push(ValidationError {
                code: "ZERO_QUANTITY".to_string(),
                field: "calculated_qty".to_string(),
                message: "sizing produced a non-positive quantity".to_string(),
            });
        }

        let validation_passed = errors.is_empty();
        let status = if validation_passed { IntentStatus::Approved } else { IntentStatus::Rejected };

        let conn = self.conn.lock();
        let intent_id = Uuid::new_v4();
        let now = Utc::now();
        let errors_json = serde_json::to_string(&errors).map_err(|e| AppError::Internal(e.to_string()))?;

        conn.execute(
            "INSERT INTO trade_intents (
                intent_id, signal_id, user_broker_id, delivery_id, validation_passed,
                validation_errors_json, calculated_qty, calculated_value, order_type,
                limit_price, product_type, log_impact, portfolio_exposure_after, status,
                order_id, trade_id, error_code, error_message, placed_at,
                created_at, updated_at, deleted_at, version
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,'LIMIT',?9,?10,?11,?12,?13,NULL,NULL,NULL,NULL,NULL,?14,?14,NULL,1)",
            params![
                intent_id.to_string(),
                input.signal.signal_id.to_string(),
                input.user_broker_id.to_string(),
                input.delivery_id.to_string(),
                validation_passed as i64,
                errors_json,
                quantity.to_string(),
                notional_value.to_string(),
                input.signal.reference_price.to_string(),
                input.product_type,
                log_impact.to_string(),
                exposure_after.to_string(),
                status.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        append_tx(
            &conn,
            &NewTradeEvent::user_broker("INTENT_CREATED", input.user_broker_id, "system")
                .with_signal(input.signal.signal_id)
                .with_intent(intent_id)
                .with_payload(serde_json::json!({"status": status.as_str(), "validation_passed": validation_passed})),
        )?;

        conn.query_row(
            "SELECT * FROM trade_intents WHERE intent_id = ?1 AND deleted_at IS NULL",
            params![intent_id.to_string()],
            row_to_intent,
        )
        .map_err(AppError::from)
    }

    /// Hard-deletes an intent that lost the race to consume its delivery
    /// (spec §8: a delivery is single-use, so the loser must leave no
    /// trace referencing the signal, not even a soft-deleted row).
    pub fn discard_trade_intent(&self, intent_id: Uuid) -> Result<(), AppError> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM trade_intents WHERE intent_id = ?1",
            params![intent_id.to_string()],
        )?;
        Ok(())
    }

    pub fn find_trade_intent(&self, intent_id: Uuid) -> Result<TradeIntent, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM trade_intents WHERE intent_id = ?1 AND deleted_at IS NULL",
            params![intent_id.to_string()],
            row_to_intent,
        )
        .map_err(AppError::from)
    }

    /// Step 3: places the order for an APPROVED intent, then upserts the
    /// single `Trade` row keyed by `intent_id` (spec §4.5: trades are
    /// written by exactly one writer, the owning intent, so this step
    /// never races).
    pub async fn place_entry_order(
        &self,
        intent_id: Uuid,
        adapter: &dyn BrokerAdapter,
    ) -> Result<Trade, AppError> {
        let intent = self.find_trade_intent(intent_id)?;
        if intent.status != IntentStatus::Approved {
            return Err(AppError::ConflictState(format!(
                "intent {intent_id} is not APPROVED (status={:?})",
                intent.status
            )));
        }

        let request = OrderRequest {
            client_order_id: intent_id,
            symbol: String::new(),
            side: OrderSide::Buy,
            quantity: intent.calculated_qty,
            order_type: intent.order_type,
            limit_price: intent.limit_price,
        };

        let (version, now) = {
            let conn = self.conn.lock();
            let version = current_version(&conn, "trade_intents", "intent_id", &intent_id.to_string())?;
            let now = Utc::now();

            conn.execute(
                "UPDATE trade_intents SET deleted_at = ?1 WHERE intent_id = ?2 AND version = ?3 AND deleted_at IS NULL",
                params![now.to_rfc3339(), intent_id.to_string(), version],
            )?;
            if conn.changes() == 0 {
                return Err(AppError::ConflictVersion(format!("trade_intents({intent_id}, version={version})")));
            }

            // Spec §4.5 step 5, §9: the trade row exists before any order
            // leaves the process, so a crash mid-placement — or an adapter
            // rejection — always has a CREATED row to reconcile against
            // rather than a dangling intent.
            self.upsert_trade_tx(
                &conn,
                TradeUpsert {
                    status: Some(TradeStatus::Created),
                    signal_id: Some(intent.signal_id),
                    user_broker_id: Some(intent.user_broker_id),
                    quantity: Some(intent.calculated_qty),
                    entry_value: Some(intent.calculated_value),
                    product_type: Some(intent.product_type.clone()),
                    log_impact: Some(intent.log_impact),
                    ..TradeUpsert::new(intent_id)
                },
            )?;
            (version, now)
        };

        let ack = adapter.place_order(request).await;

        let conn = self.conn.lock();
        let (new_status, order_id, error_code, error_message) = match &ack {
            Ok(a) => (IntentStatus::Placed, Some(a.broker_order_id.clone()), None, None),
            Err(AppError::AdapterRejected { code, message }) => {
                (IntentStatus::Failed, None, Some(code.clone()), Some(message.clone()))
            }
            Err(_) => (IntentStatus::Failed, None, Some("ADAPTER_ERROR".to_string()), Some("adapter call failed".to_string())),
        };

        conn.execute(
            "INSERT INTO trade_intents (
                intent_id, signal_id, user_broker_id, delivery_id, validation_passed,
                validation_errors_json, calculated_qty, calculated_value, order_type,
                limit_price, product_type, log_impact, portfolio_exposure_after, status,
                order_id, trade_id, error_code, error_message, placed_at,
                created_at, updated_at, deleted_at, version
            ) SELECT
                intent_id, signal_id, user_broker_id, delivery_id, validation_passed,
                validation_errors_json, calculated_qty, calculated_value, order_type,
                limit_price, product_type, log_impact, portfolio_exposure_after, ?1,
                ?2, NULL, ?3, ?4, ?5,
                created_at, ?5, NULL, ?6
             FROM trade_intents WHERE intent_id = ?7 AND version = ?8",
            params![
                new_status.as_str(),
                order_id,
                error_code,
                error_message,
                now.to_rfc3339(),
                version + 1,
                intent_id.to_string(),
                version,
            ],
        )?;

        append_tx(
            &conn,
            &NewTradeEvent::user_broker("ORDER_PLACEMENT_ATTEMPTED", intent.user_broker_id, "system")
                .with_intent(intent_id)
                .with_payload(serde_json::json!({"status": new_status.as_str()})),
        )?;

        let trade_id = match &ack {
            Ok(a) => self.upsert_trade_tx(
                &conn,
                TradeUpsert {
                    status: Some(TradeStatus::Open),
                    signal_id: Some(intent.signal_id),
                    user_broker_id: Some(intent.user_broker_id),
                    quantity: Some(intent.calculated_qty),
                    entry_price: Some(a.fill_price.unwrap_or(intent.calculated_value / intent.calculated_qty.max(Decimal::ONE))),
                    entry_value: Some(intent.calculated_value),
                    product_type: Some(intent.product_type.clone()),
                    log_impact: Some(intent.log_impact),
                    broker_order_id: Some(a.broker_order_id.clone()),
                    ..TradeUpsert::new(intent_id)
                },
            )?,
            // Scenario 5 (spec §8): the prior CREATED row moves to
            // REJECTED rather than a fresh row being inserted.
            Err(_) => self.mark_rejected_by_intent_id(&conn, intent_id)?,
        };

        ack.map_err(|e| e)?;

        self.find_trade_tx(&conn, trade_id)
    }

    /// CREATED -> REJECTED, single-use (spec §4.5 step 5, §9, §8 scenario
    /// 5). Moves the trade row written before the broker was ever called,
    /// rather than inserting a fresh REJECTED row.
    fn mark_rejected_by_intent_id(&self, conn: &rusqlite::Connection, intent_id: Uuid) -> Result<Uuid, AppError> {
        let existing: (String, i64) = conn.query_row(
            "SELECT trade_id, version FROM trades WHERE intent_id = ?1 AND deleted_at IS NULL",
            params![intent_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE trades SET status = 'REJECTED', updated_at = ?1, version = version + 1
             WHERE trade_id = ?2 AND version = ?3 AND status = 'CREATED'",
            params![now, existing.0, existing.1],
        )?;
        if conn.changes() == 0 {
            return Err(AppError::ConflictVersion(format!("trades({}, version={})", existing.0, existing.1)));
        }
        Ok(Uuid::parse_str(&existing.0).unwrap_or_default())
    }

    fn upsert_trade_tx(&self, conn: &rusqlite::Connection, upsert: TradeUpsert) -> Result<Uuid, AppError> {
        let existing: Option<(String, i64)> = conn
            .query_row(
                "SELECT trade_id, version FROM trades WHERE intent_id = ?1 AND deleted_at IS NULL",
                params![upsert.intent_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let now = Utc::now().to_rfc3339();
        let zones_json = upsert
            .zones
            .as_ref()
            .map(|z| serde_json::to_string(z).unwrap_or_default());

        match existing {
            Some((id, version)) => {
                conn.execute(
                    "UPDATE trades SET
                        status = COALESCE(?1, status),
                        quantity = COALESCE(?2, quantity),
                        entry_price = COALESCE(?3, entry_price),
                        entry_value = COALESCE(?4, entry_value),
                        product_type = COALESCE(?5, product_type),
                        zones_json = COALESCE(?6, zones_json),
                        log_impact = COALESCE(?7, log_impact),
                        broker_order_id = COALESCE(?8, broker_order_id),
                        updated_at = ?9,
                        version = version + 1
                    WHERE trade_id = ?10 AND version = ?11",
                    params![
                        upsert.status.map(|s| s.as_str()),
                        upsert.quantity.map(|d| d.to_string()),
                        upsert.entry_price.map(|d| d.to_string()),
                        upsert.entry_value.map(|d| d.to_string()),
                        upsert.product_type,
                        zones_json,
                        upsert.log_impact.map(|d| d.to_string()),
                        upsert.broker_order_id,
                        now,
                        id,
                        version,
                    ],
                )?;
                if conn.changes() == 0 {
                    return Err(AppError::ConflictVersion(format!("trades({id}, version={version})")));
                }
                Ok(Uuid::parse_str(&id).unwrap_or_default())
            }
            None => {
                let trade_id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO trades (
                        trade_id, intent_id, signal_id, user_broker_id, status, quantity,
                        entry_price, entry_value, product_type, zones_json, entry_band_low, entry_band_high,
                        log_impact, target_price, stop_price, current_price, current_log_return, unrealized_pnl,
                        trailing_stop_active, trailing_stop_highest_price, trailing_stop_stop_price,
                        exit_price, exit_at, exit_trigger, exit_order_id, realized_pnl, realized_log_return,
                        holding_days, broker_order_id, broker_trade_id, client_order_id,
                        created_at, updated_at, deleted_at, version
                    ) VALUES (
                        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL,
                        ?11, NULL, NULL, NULL, NULL, NULL,
                        0, NULL, NULL,
                        NULL, NULL, NULL, NULL, NULL, NULL,
                        NULL, ?12, NULL, NULL,
                        ?13, ?13, NULL, 1
                    )",
                    params![
                        trade_id.to_string(),
                        upsert.intent_id.to_string(),
                        upsert.signal_id.map(|u| u.to_string()),
                        upsert.user_broker_id.map(|u| u.to_string()),
                        upsert.status.unwrap_or(TradeStatus::Created).as_str(),
                        upsert.quantity.map(|d| d.to_string()),
                        upsert.entry_price.map(|d| d.to_string()),
                        upsert.entry_value.map(|d| d.to_string()),
                        upsert.product_type,
                        zones_json,
                        upsert.log_impact.map(|d| d.to_string()),
                        upsert.broker_order_id,
                        now,
                    ],
                )?;
                Ok(trade_id)
            }
        }
    }

    fn find_trade_tx(&self, conn: &rusqlite::Connection, trade_id: Uuid) -> Result<Trade, AppError> {
        conn.query_row(
            "SELECT * FROM trades WHERE trade_id = ?1 AND deleted_at IS NULL",
            params![trade_id.to_string()],
            row_to_trade,
        )
        .map_err(AppError::from)
    }

    pub fn find_trade(&self, trade_id: Uuid) -> Result<Trade, AppError> {
        let conn = self.conn.lock();
        self.find_trade_tx(&conn, trade_id)
    }

    pub fn find_trade_by_intent(&self, intent_id: Uuid) -> Result<Trade, AppError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM trades WHERE intent_id = ?1 AND deleted_at IS NULL",
            params![intent_id.to_string()],
            row_to_trade,
        )
        .map_err(AppError::from)
    }

    /// Reconciler background task target: FAILED intents whose order was
    /// never confirmed placed, so a retry (or manual cancel) can act on
    /// them (spec §4.5).
    pub fn find_failed_intents(&self) -> Result<Vec<TradeIntent>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_intents WHERE deleted_at IS NULL AND status = 'FAILED'",
        )?;
        let rows = stmt.query_map([], row_to_intent)?;
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
    use crate::broker::adapter::{PaperBrokerAdapter, PaperBrokerConfig};
    use crate::models::signal::{Direction as Dir, SignalUpsert, TimeframeZones, ZoneBand};
    use rust_decimal_macros::dec;

    fn sample_signal(store: &Store) -> Signal {
        let now = Utc::now();
        store
            .signal_upsert(
                SignalUpsert {
                    symbol: "RELIANCE".to_string(),
                    confluence_type: "HTF_ITF_LTF".to_string(),
                    direction: Dir::Long,
                    signal_type: "BUY_ZONE".to_string(),
                    zones: TimeframeZones {
                        htf: ZoneBand { low: dec!(100), high: dec!(110) },
                        itf: ZoneBand { low: dec!(101), high: dec!(109) },
                        ltf: ZoneBand { low: dec!(102), high: dec!(108) },
                    },
                    p_win: dec!(0.6),
                    p_fill: dec!(0.8),
                    kelly: dec!(0.2),
                    reference_price: dec!(100),
                    entry_band: ZoneBand { low: dec!(99), high: dec!(101) },
                    effective_floor: dec!(99.00),
                    effective_ceiling: dec!(101.00),
                    confidence: dec!(0.8),
                    tags: vec![],
                    generated_at: now,
                    expires_at: now + chrono::Duration::hours(1),
                },
                "UTC",
            )
            .unwrap()
    }

    fn sample_input(store: &Store) -> TradeIntentInput {
        TradeIntentInput {
            delivery_id: Uuid::new_v4(),
            user_broker_id: Uuid::new_v4(),
            signal: sample_signal(store),
            available_capital: dec!(100000),
            kelly_fraction: dec!(1.0),
            position_log_loss_cap: dec!(1.0),
            per_trade_cap: dec!(10000),
            portfolio_exposure_before: dec!(0),
            max_exposure: dec!(50000),
            product_type: "CNC".to_string(),
            allowed_product_types: vec![],
            block_symbols: vec![],
            atr_ratio: dec!(1.0),
        }
    }

    #[test]
    fn create_intent_approves_when_sizing_succeeds() {
        let store = Store::open_in_memory().unwrap();
        let input = sample_input(&store);
        let intent = store.create_trade_intent(&input).unwrap();
        assert_eq!(intent.status, IntentStatus::Approved);
        assert!(intent.calculated_qty > Decimal::ZERO);
    }

    #[test]
    fn create_intent_rejects_blocked_symbol() {
        let store = Store::open_in_memory().unwrap();
        let mut input = sample_input(&store);
        input.block_symbols = vec!["RELIANCE".to_string()];
        let intent = store.create_trade_intent(&input).unwrap();
        assert_eq!(intent.status, IntentStatus::Rejected);
        assert!(!intent.validation_errors.is_empty());
    }

    #[tokio::test]
    async fn place_entry_order_opens_a_trade() {
        let store = Store::open_in_memory().unwrap();
        let input = sample_input(&store);
        let intent = store.create_trade_intent(&input).unwrap();
        let adapter = PaperBrokerAdapter::new(PaperBrokerConfig {
            simulated_latency_ms: 0,
            slippage_bps: Decimal::ZERO,
            rejection_rate_pct: Decimal::ZERO,
        });
        let trade = store.place_entry_order(intent.intent_id, &adapter).await.unwrap();
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.intent_id, intent.intent_id);
    }
}
