//! Confluence signal engine entrypoint, adapted from the teacher's
//! `main.rs`: env/tracing init, store + adapter construction, router bind,
//! then a handful of `tokio::spawn` background loops running alongside the
//! HTTP server for the long-lived reconciliation work (spec §2, §5).

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confluence_backend::api::{build_router, AppState};
use confluence_backend::broker::adapter::{BrokerAdapter, PaperBrokerAdapter, PaperBrokerConfig};
use confluence_backend::config::Config;
use confluence_backend::db::Store;
use confluence_backend::middleware::rate_limit::{RateLimitConfig, RateLimitLayer};
use confluence_backend::models::signal::SignalStatus;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    info!(database_path = %config.database_path, port = config.port, "starting confluence engine");

    let store = Store::open(&config.database_path).context("opening store")?;

    let broker_adapter: Arc<dyn BrokerAdapter> =
        Arc::new(PaperBrokerAdapter::new(PaperBrokerConfig::from_env()));

    let state = AppState {
        store: store.clone(),
        config: config.clone(),
        broker_adapter: broker_adapter.clone(),
        rate_limit: RateLimitLayer::new(RateLimitConfig::from_env()),
    };

    tokio::spawn(expiry_scheduler(store.clone(), config.clone()));
    tokio::spawn(intent_reconciler(store.clone(), broker_adapter.clone(), config.clone()));
    tokio::spawn(session_reaper(store.clone(), config.clone()));

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confluence_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Sweeps signals whose `expires_at` has passed into `EXPIRED`, cascading
/// to their deliveries (spec §4.3).
async fn expiry_scheduler(store: Store, config: Config) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.expiry_scan_interval_secs));
    loop {
        ticker.tick().await;
        let due = match store.find_expiring_soon(chrono::Duration::seconds(0)) {
            Ok(signals) => signals,
            Err(e) => {
                error!(error = %e, "expiry scan failed");
                continue;
            }
        };
        for signal in due {
            if signal.status.is_terminal() {
                continue;
            }
            match store.update_signal_status(signal.signal_id, SignalStatus::Expired) {
                Ok(_) => info!(signal_id = %signal.signal_id, "signal expired"),
                Err(e) => warn!(signal_id = %signal.signal_id, error = %e, "failed to expire signal"),
            }
        }
    }
}

/// Re-attempts broker placement for intents left in `FAILED` by a crashed
/// or disconnected prior attempt (spec §5.4).
async fn intent_reconciler(store: Store, broker_adapter: Arc<dyn BrokerAdapter>, config: Config) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.reconciler_interval_secs));
    loop {
        ticker.tick().await;
        let failed = match store.find_failed_intents() {
            Ok(intents) => intents,
            Err(e) => {
                error!(error = %e, "reconciler scan failed");
                continue;
            }
        };
        for intent in failed {
            match store.place_entry_order(intent.intent_id, broker_adapter.as_ref()).await {
                Ok(trade) => info!(intent_id = %intent.intent_id, trade_id = %trade.trade_id, "intent reconciled"),
                Err(e) => warn!(intent_id = %intent.intent_id, error = %e, "reconcile attempt failed"),
            }
        }
    }
}

/// Revokes broker sessions past `token_valid_till` that the owning
/// connector never closed out (spec §5.2).
async fn session_reaper(store: Store, config: Config) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.reconciler_interval_secs));
    loop {
        ticker.tick().await;
        let expired = match store.find_expired_session_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "session reaper scan failed");
                continue;
            }
        };
        for session_id in expired {
            match store.revoke_session(session_id) {
                Ok(()) => info!(session_id = %session_id, "expired session revoked"),
                Err(e) => warn!(session_id = %session_id, error = %e, "failed to revoke expired session"),
            }
        }
    }
}
