//! HTTP admin surface (spec §6), adapted from the teacher's `api::routes`
//! + `main.rs` router composition: an `AppState` cloned into every
//! handler via `.with_state()`, a public OAuth callback, and a
//! bearer-token-protected `/api/admin/*` tree for everything else.

pub mod admin_auth;
pub mod routes;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broker::adapter::BrokerAdapter;
use crate::config::Config;
use crate::db::Store;
use crate::middleware::logging::request_logging;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub broker_adapter: Arc<dyn BrokerAdapter>,
    pub rate_limit: RateLimitLayer,
}

impl FromRef<AppState> for RateLimitLayer {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limit.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/health", get(routes::get_health))
        .route("/brokers", get(routes::list_brokers))
        .route(
            "/user-brokers",
            get(routes::list_user_brokers).post(routes::create_user_broker),
        )
        .route("/user-brokers/:user_broker_id", axum::routing::delete(routes::delete_user_broker))
        .route("/user-brokers/:user_broker_id/toggle", post(routes::toggle_user_broker))
        .route("/data-broker", get(routes::get_data_broker))
        .route("/brokers/:user_broker_id/session", get(routes::get_broker_session))
        .route("/brokers/:user_broker_id/disconnect", post(routes::disconnect_broker))
        .route("/brokers/:user_broker_id/test-connection", post(routes::test_connection))
        .route("/signals", get(routes::list_signals).post(routes::create_signal))
        .route("/signals/:signal_id", get(routes::get_signal))
        .route("/signals/:signal_id/status", post(routes::set_signal_status))
        .route("/deliveries/:signal_id", get(routes::list_deliveries))
        .route("/intents", post(routes::create_intent))
        .route("/intents/:intent_id", get(routes::get_intent))
        .route("/intents/:intent_id/place", post(routes::place_intent))
        .route("/trades/:trade_id", get(routes::get_trade))
        .route("/portfolios", get(routes::list_portfolios).post(routes::create_portfolio))
        .route("/exit-signals", post(routes::detect_exit))
        .route("/exit-intents/:exit_intent_id/approve", post(routes::approve_exit_intent))
        .route("/exit-intents/:exit_intent_id/execute", post(routes::execute_exit_intent))
        .route("/watchlist/:user_broker_id", get(routes::get_watchlist))
        .route("/watchlist", post(routes::add_watchlist_entry))
        .route(
            "/watchlist-templates",
            get(routes::list_watchlist_templates).post(routes::create_watchlist_template),
        )
        .route(
            "/watchlist-selected",
            post(routes::create_watchlist_selected),
        )
        .route("/watchlist-selected/:selected_id/toggle", post(routes::toggle_watchlist_selected))
        .route("/watchlist-default", get(routes::get_watchlist_default))
        .route("/watchlist-sync/:user_broker_id", post(routes::sync_watchlist))
        .route("/config/global", get(routes::get_global_config).post(routes::set_global_config))
        .route(
            "/config/symbols/:symbol",
            get(routes::get_symbol_config).post(routes::set_symbol_config),
        )
        .route("/instruments/search", get(routes::search_instruments))
        .route("/events", get(routes::list_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth::require_admin_token));

    let public_routes = Router::new()
        .route("/oauth/callback", post(routes::oauth_callback))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .nest("/api/admin", admin_routes)
        .nest("/api", public_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
