//! Application configuration, loaded from the environment.

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// Bearer token required on every `/api/admin/*` request except the
    /// OAuth callback.
    pub admin_bearer_token: String,
    /// IANA timezone used to derive `Signal.signal_day` from `generated_at`.
    pub signal_timezone: String,
    /// Poll interval for the expiry scheduler background task.
    pub expiry_scan_interval_secs: u64,
    /// Poll interval for the FAILED-intent reconciler background task.
    pub reconciler_interval_secs: u64,
    /// Window used by `find_expiring_soon`.
    pub expiry_lookahead_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./confluence.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let admin_bearer_token =
            std::env::var("ADMIN_BEARER_TOKEN").unwrap_or_else(|_| "dev-admin-token".to_string());

        let signal_timezone =
            std::env::var("SIGNAL_TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".to_string());

        let expiry_scan_interval_secs = std::env::var("EXPIRY_SCAN_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let reconciler_interval_secs = std::env::var("RECONCILER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let expiry_lookahead_secs = std::env::var("EXPIRY_LOOKAHEAD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            database_path,
            port,
            admin_bearer_token,
            signal_timezone,
            expiry_scan_interval_secs,
            reconciler_interval_secs,
            expiry_lookahead_secs,
        })
    }
}
