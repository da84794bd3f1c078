//! Admin HTTP handlers (spec §6), adapted from the teacher's
//! `api::routes::get_signals`/`run_backtest_handler` shape: a `Query` or
//! `Json` extractor in, a typed response struct out, errors flowing
//! through [`AppError`]'s `IntoResponse`.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::broker::registry::UserBrokerInput;
use crate::error::{AppError, AppResult};
use crate::intents::entry::TradeIntentInput;
use crate::intents::exit::ExitDetection;
use crate::models::broker::{Broker, RiskPolicy, UserBroker, UserBrokerRole, UserBrokerSession};
use crate::models::event::EventFilter;
use crate::models::exit::ExitReason;
use crate::models::mtf_config::MtfGlobalConfig;
use crate::models::mtf_config::MtfSymbolConfig;
use crate::models::portfolio::{AllocationMode, Portfolio};
use crate::models::signal::{Direction, Signal, SignalStatus, SignalUpsert, TimeframeZones, ZoneBand};
use crate::models::watchlist::{WatchlistSelected, WatchlistTemplate};
use crate::monitoring::HealthSnapshot;
use crate::portfolio::PortfolioInput;

pub async fn get_health(State(state): State<AppState>) -> AppResult<Json<HealthSnapshot>> {
    Ok(Json(state.store.health_snapshot()?))
}

pub async fn list_brokers(State(state): State<AppState>) -> AppResult<Json<Vec<Broker>>> {
    Ok(Json(state.store.list_brokers()?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBrokerRequest {
    pub user_id: Uuid,
    pub broker_id: Uuid,
    pub role: String,
    pub credentials: String,
    #[serde(default)]
    pub risk_policy: RiskPolicy,
}

pub async fn create_user_broker(
    State(state): State<AppState>,
    Json(req): Json<CreateUserBrokerRequest>,
) -> AppResult<Json<UserBroker>> {
    let input = UserBrokerInput {
        user_id: req.user_id,
        broker_id: req.broker_id,
        role: UserBrokerRole::from_str(&req.role),
        credentials: req.credentials,
        risk_policy: req.risk_policy,
    };
    Ok(Json(state.store.link_user_broker(input)?))
}

#[derive(Debug, Deserialize)]
pub struct ListUserBrokersQuery {
    pub user_id: Uuid,
}

pub async fn list_user_brokers(
    State(state): State<AppState>,
    Query(q): Query<ListUserBrokersQuery>,
) -> AppResult<Json<Vec<UserBroker>>> {
    Ok(Json(state.store.list_user_brokers(q.user_id)?))
}

pub async fn delete_user_broker(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.unlink_user_broker(user_broker_id)?;
    Ok(Json(serde_json::json!({"success": true})))
}

#[derive(Debug, Deserialize)]
pub struct ToggleUserBrokerRequest {
    pub enabled: bool,
}

pub async fn toggle_user_broker(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
    Json(req): Json<ToggleUserBrokerRequest>,
) -> AppResult<Json<UserBroker>> {
    Ok(Json(state.store.toggle_user_broker(user_broker_id, req.enabled)?))
}

pub async fn get_data_broker(State(state): State<AppState>) -> AppResult<Json<Option<UserBroker>>> {
    Ok(Json(state.store.find_data_broker()?))
}

#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    pub session: Option<UserBrokerSession>,
}

pub async fn get_broker_session(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<SessionStateResponse>> {
    let session = state.store.find_active_session_for_user_broker(user_broker_id)?;
    Ok(Json(SessionStateResponse { session }))
}

pub async fn disconnect_broker(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.revoke_sessions_for_user_broker(user_broker_id)?;
    Ok(Json(serde_json::json!({"success": true})))
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub ok: bool,
}

pub async fn test_connection(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<TestConnectionResponse>> {
    let ub = state.store.find_user_broker(user_broker_id)?;
    Ok(Json(TestConnectionResponse { ok: ub.enabled && ub.connected }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSignalRequest {
    pub symbol: String,
    pub confluence_type: String,
    pub direction: String,
    pub signal_type: String,
    pub zones: TimeframeZones,
    pub p_win: Decimal,
    pub p_fill: Decimal,
    pub kelly: Decimal,
    pub reference_price: Decimal,
    pub entry_band: ZoneBand,
    pub effective_floor: Decimal,
    pub effective_ceiling: Decimal,
    pub confidence: Decimal,
    #[serde(default)]
    pub tags: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn create_signal(
    State(state): State<AppState>,
    Json(req): Json<CreateSignalRequest>,
) -> AppResult<Json<Signal>> {
    let upsert = SignalUpsert {
        symbol: req.symbol,
        confluence_type: req.confluence_type,
        direction: Direction::from_str(&req.direction),
        signal_type: req.signal_type,
        zones: req.zones,
        p_win: req.p_win,
        p_fill: req.p_fill,
        kelly: req.kelly,
        reference_price: req.reference_price,
        entry_band: req.entry_band,
        effective_floor: crate::time_util::round_price_half_up(req.effective_floor),
        effective_ceiling: crate::time_util::round_price_half_up(req.effective_ceiling),
        confidence: req.confidence,
        tags: req.tags,
        generated_at: req.generated_at,
        expires_at: req.expires_at,
    };
    let signal = state.store.signal_upsert(upsert, &state.config.signal_timezone)?;
    Ok(Json(signal))
}

#[derive(Debug, Deserialize)]
pub struct ListSignalsQuery {
    pub status: Option<String>,
}

pub async fn list_signals(
    State(state): State<AppState>,
    Query(q): Query<ListSignalsQuery>,
) -> AppResult<Json<Vec<Signal>>> {
    let lookahead = chrono::Duration::seconds(state.config.expiry_lookahead_secs);
    let signals = match q.status.as_deref() {
        Some("EXPIRING_SOON") => state.store.find_expiring_soon(lookahead)?,
        _ => state.store.find_expiring_soon(chrono::Duration::days(3650))?,
    };
    Ok(Json(signals))
}

pub async fn get_signal(
    State(state): State<AppState>,
    Path(signal_id): Path<Uuid>,
) -> AppResult<Json<Signal>> {
    Ok(Json(state.store.find_current_signal(signal_id)?))
}

#[derive(Debug, Deserialize)]
pub struct SetSignalStatusRequest {
    pub status: String,
}

pub async fn set_signal_status(
    State(state): State<AppState>,
    Path(signal_id): Path<Uuid>,
    Json(req): Json<SetSignalStatusRequest>,
) -> AppResult<Json<Signal>> {
    let status = SignalStatus::from_str(&req.status);
    Ok(Json(state.store.update_signal_status(signal_id, status)?))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(signal_id): Path<Uuid>,
) -> AppResult<Json<Vec<crate::models::delivery::SignalDelivery>>> {
    Ok(Json(state.store.find_deliveries_for_signal(signal_id)?))
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub delivery_id: Uuid,
    pub user_broker_id: Uuid,
    pub signal_id: Uuid,
    pub available_capital: Decimal,
    pub kelly_fraction: Decimal,
    pub position_log_loss_cap: Decimal,
    pub per_trade_cap: Decimal,
    pub portfolio_exposure_before: Decimal,
    pub max_exposure: Decimal,
    pub product_type: String,
    #[serde(default)]
    pub allowed_product_types: Vec<String>,
    #[serde(default)]
    pub block_symbols: Vec<String>,
    pub atr_ratio: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub intent: crate::models::intent::TradeIntent,
    pub delivery_consumed: bool,
}

pub async fn create_intent(
    State(state): State<AppState>,
    Json(req): Json<CreateIntentRequest>,
) -> AppResult<Json<CreateIntentResponse>> {
    let signal = state.store.find_current_signal(req.signal_id)?;
    let input = TradeIntentInput {
        delivery_id: req.delivery_id,
        user_broker_id: req.user_broker_id,
        signal,
        available_capital: req.available_capital,
        kelly_fraction: req.kelly_fraction,
        position_log_loss_cap: req.position_log_loss_cap,
        per_trade_cap: req.per_trade_cap,
        portfolio_exposure_before: req.portfolio_exposure_before,
        max_exposure: req.max_exposure,
        product_type: req.product_type,
        allowed_product_types: req.allowed_product_types,
        block_symbols: req.block_symbols,
        atr_ratio: req.atr_ratio,
    };
    let intent = state.store.create_trade_intent(&input)?;
    let delivery_consumed = state.store.consume_delivery(req.delivery_id, intent.intent_id)?;
    if !delivery_consumed {
        // Spec §8: a delivery is single-use, so the loser of a race for
        // the same delivery must not leave an intent referencing the
        // signal behind it.
        state.store.discard_trade_intent(intent.intent_id)?;
        return Err(AppError::ConflictState(format!(
            "delivery {} was already consumed",
            req.delivery_id
        )));
    }
    Ok(Json(CreateIntentResponse { intent, delivery_consumed }))
}

pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<Uuid>,
) -> AppResult<Json<crate::models::intent::TradeIntent>> {
    Ok(Json(state.store.find_trade_intent(intent_id)?))
}

pub async fn place_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<Uuid>,
) -> AppResult<Json<crate::models::trade::Trade>> {
    let trade = state
        .store
        .place_entry_order(intent_id, state.broker_adapter.as_ref())
        .await?;
    Ok(Json(trade))
}

pub async fn get_trade(
    State(state): State<AppState>,
    Path(trade_id): Path<Uuid>,
) -> AppResult<Json<crate::models::trade::Trade>> {
    Ok(Json(state.store.find_trade(trade_id)?))
}

#[derive(Debug, Deserialize)]
pub struct DetectExitRequest {
    pub trade_id: Uuid,
    pub user_broker_id: Uuid,
    pub exit_reason: String,
    pub detected_price: Decimal,
    #[serde(default)]
    pub brick_movement: Option<Decimal>,
    #[serde(default)]
    pub favorable_movement: Option<Decimal>,
    #[serde(default)]
    pub highest_since_entry: Option<Decimal>,
    #[serde(default)]
    pub lowest_since_entry: Option<Decimal>,
    #[serde(default)]
    pub trailing_stop_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct DetectExitResponse {
    pub episode_id: i64,
    pub exit_intent: crate::models::exit::ExitIntent,
}

pub async fn detect_exit(
    State(state): State<AppState>,
    Json(req): Json<DetectExitRequest>,
) -> AppResult<Json<DetectExitResponse>> {
    let detection = ExitDetection {
        trade_id: req.trade_id,
        exit_reason: ExitReason::from_str(&req.exit_reason),
        detected_price: req.detected_price,
        brick_movement: req.brick_movement,
        favorable_movement: req.favorable_movement,
        highest_since_entry: req.highest_since_entry,
        lowest_since_entry: req.lowest_since_entry,
        trailing_stop_price: req.trailing_stop_price,
    };
    let episode_id = state.store.generate_exit_episode(&detection)?;

    let exit_signal_id: Uuid = {
        let conn = state.store.conn.lock();
        let raw: String = conn.query_row(
            "SELECT exit_signal_id FROM exit_signals WHERE trade_id = ?1 AND exit_reason = ?2 AND episode_id = ?3",
            rusqlite::params![req.trade_id.to_string(), detection.exit_reason.as_str(), episode_id],
            |row| row.get(0),
        )?;
        Uuid::parse_str(&raw).map_err(|e| AppError::Internal(e.to_string()))?
    };

    let exit_intent = state.store.create_exit_intent(
        exit_signal_id,
        req.trade_id,
        req.user_broker_id,
        detection.exit_reason,
        episode_id,
    )?;

    Ok(Json(DetectExitResponse { episode_id, exit_intent }))
}

pub async fn approve_exit_intent(
    State(state): State<AppState>,
    Path(exit_intent_id): Path<Uuid>,
) -> AppResult<Json<crate::models::exit::ExitIntent>> {
    Ok(Json(state.store.approve_exit_intent(exit_intent_id)?))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteExitRequest {
    #[serde(default)]
    pub limit_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteExitResponse {
    pub placed: bool,
}

pub async fn execute_exit_intent(
    State(state): State<AppState>,
    Path(exit_intent_id): Path<Uuid>,
    Json(req): Json<ExecuteExitRequest>,
) -> AppResult<Json<ExecuteExitResponse>> {
    let intent = state.store.find_exit_intent(exit_intent_id)?;
    let trade = state.store.find_trade(intent.trade_id)?;
    let quantity = trade.quantity.unwrap_or_default();
    let placed = state
        .store
        .execute_exit_order(exit_intent_id, quantity, req.limit_price, state.broker_adapter.as_ref())
        .await?;
    Ok(Json(ExecuteExitResponse { placed }))
}

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub user_id: Uuid,
    pub name: String,
    pub total_capital: Decimal,
    pub max_portfolio_log_loss: Decimal,
    pub max_symbol_weight: Decimal,
    pub max_symbols: i64,
    pub allocation_mode: String,
}

pub async fn create_portfolio(
    State(state): State<AppState>,
    Json(req): Json<CreatePortfolioRequest>,
) -> AppResult<Json<Portfolio>> {
    let input = PortfolioInput {
        user_id: req.user_id,
        name: req.name,
        total_capital: req.total_capital,
        max_portfolio_log_loss: req.max_portfolio_log_loss,
        max_symbol_weight: req.max_symbol_weight,
        max_symbols: req.max_symbols,
        allocation_mode: AllocationMode::from_str(&req.allocation_mode),
    };
    Ok(Json(state.store.create_portfolio(input)?))
}

#[derive(Debug, Deserialize)]
pub struct ListPortfoliosQuery {
    pub user_id: Uuid,
}

pub async fn list_portfolios(
    State(state): State<AppState>,
    Query(q): Query<ListPortfoliosQuery>,
) -> AppResult<Json<Vec<Portfolio>>> {
    Ok(Json(state.store.list_portfolios_for_user(q.user_id)?))
}

pub async fn get_watchlist(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<Vec<crate::models::watchlist::WatchlistEntry>>> {
    Ok(Json(state.store.list_watchlist(user_broker_id)?))
}

#[derive(Debug, Deserialize)]
pub struct CreateWatchlistTemplateRequest {
    pub name: String,
    pub symbols: Vec<String>,
}

pub async fn list_watchlist_templates(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<WatchlistTemplate>>> {
    Ok(Json(state.store.list_templates()?))
}

pub async fn create_watchlist_template(
    State(state): State<AppState>,
    Json(req): Json<CreateWatchlistTemplateRequest>,
) -> AppResult<Json<WatchlistTemplate>> {
    Ok(Json(state.store.create_template(&req.name, req.symbols)?))
}

#[derive(Debug, Deserialize)]
pub struct SelectTemplateRequest {
    pub template_id: Uuid,
    pub name: String,
}

pub async fn create_watchlist_selected(
    State(state): State<AppState>,
    Json(req): Json<SelectTemplateRequest>,
) -> AppResult<Json<WatchlistSelected>> {
    Ok(Json(state.store.select_template(req.template_id, &req.name)?))
}

#[derive(Debug, Deserialize)]
pub struct ToggleSelectedRequest {
    pub enabled: bool,
}

pub async fn toggle_watchlist_selected(
    State(state): State<AppState>,
    Path(selected_id): Path<Uuid>,
    Json(req): Json<ToggleSelectedRequest>,
) -> AppResult<Json<WatchlistSelected>> {
    Ok(Json(state.store.set_selected_enabled(selected_id, req.enabled)?))
}

pub async fn get_watchlist_default(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.store.default_watchlist_symbols()?))
}

#[derive(Debug, Serialize)]
pub struct SyncWatchlistResponse {
    pub changed: u64,
}

pub async fn sync_watchlist(
    State(state): State<AppState>,
    Path(user_broker_id): Path<Uuid>,
) -> AppResult<Json<SyncWatchlistResponse>> {
    let changed = state.store.sync_watchlist(user_broker_id)?;
    Ok(Json(SyncWatchlistResponse { changed }))
}

#[derive(Debug, Deserialize)]
pub struct AddCustomWatchlistEntryRequest {
    pub user_broker_id: Uuid,
    pub symbol: String,
}

pub async fn add_watchlist_entry(
    State(state): State<AppState>,
    Json(req): Json<AddCustomWatchlistEntryRequest>,
) -> AppResult<Json<crate::models::watchlist::WatchlistEntry>> {
    Ok(Json(state.store.add_custom_entry(req.user_broker_id, &req.symbol)?))
}

pub async fn get_global_config(State(state): State<AppState>) -> AppResult<Json<MtfGlobalConfig>> {
    Ok(Json(state.store.get_global_config()?))
}

pub async fn set_global_config(
    State(state): State<AppState>,
    Json(cfg): Json<MtfGlobalConfig>,
) -> AppResult<Json<MtfGlobalConfig>> {
    Ok(Json(state.store.set_global_config(cfg)?))
}

#[derive(Debug, Deserialize)]
pub struct SymbolConfigQuery {
    pub user_broker_id: Uuid,
}

pub async fn get_symbol_config(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<SymbolConfigQuery>,
) -> AppResult<Json<Option<MtfSymbolConfig>>> {
    Ok(Json(state.store.get_symbol_override(&symbol, q.user_broker_id)?))
}

pub async fn set_symbol_config(
    State(state): State<AppState>,
    Path(_symbol): Path<String>,
    Json(cfg): Json<MtfSymbolConfig>,
) -> AppResult<Json<MtfSymbolConfig>> {
    Ok(Json(state.store.set_symbol_override(cfg)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchInstrumentsQuery {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

pub async fn search_instruments(
    State(state): State<AppState>,
    Query(q): Query<SearchInstrumentsQuery>,
) -> AppResult<Json<Vec<crate::models::instrument::Instrument>>> {
    Ok(Json(state.store.search_instruments(&q.q, q.limit)?))
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub after_seq: Option<i64>,
    pub user_id: Option<Uuid>,
    pub user_broker_id: Option<Uuid>,
    #[serde(default = "default_event_limit")]
    pub limit: i64,
}

fn default_event_limit() -> i64 {
    100
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(q): Query<ListEventsQuery>,
) -> AppResult<Json<Vec<crate::models::event::TradeEvent>>> {
    let filter = EventFilter {
        user_id: q.user_id,
        user_broker_id: q.user_broker_id,
    };
    Ok(Json(state.store.list_events(&filter, q.after_seq.unwrap_or(0), q.limit)?))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub user_broker_id: Uuid,
    pub auth_code: String,
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Json(req): Json<OAuthCallbackRequest>,
) -> AppResult<Json<crate::models::broker::UserBrokerSession>> {
    let session = state
        .store
        .exchange_oauth_code(
            req.user_broker_id,
            &req.auth_code,
            state.broker_adapter.as_ref(),
            chrono::Duration::hours(8),
        )
        .await?;
    Ok(Json(session))
}
