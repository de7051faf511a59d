use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub intasend_base_url: String,
    pub intasend_secret_key: String,
    pub intasend_webhook_secret: String,
    pub settlement: SettlementConfig,
}

/// Knobs consumed by the dispatcher and reconciler. Kept separate from the
/// env-facing `Config` so services (and tests) take plain values.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Provider per-transaction ceiling; payouts above it are split.
    pub payout_limit: Decimal,
    /// Number of records dispatched concurrently per batch.
    pub dispatch_batch_size: usize,
    /// Delay before the safety-net status poll fires.
    pub status_check_delay: Duration,
    /// Poll attempts before a record is parked in manual review.
    pub status_check_max_attempts: u32,
    pub currency: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            payout_limit: Decimal::from(250_000),
            dispatch_batch_size: 10,
            status_check_delay: Duration::from_secs(600),
            status_check_max_attempts: 3,
            currency: "KES".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = SettlementConfig::default();

        Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            intasend_base_url: env::var("INTASEND_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.intasend.com/api".to_string()),
            intasend_secret_key: env::var("INTASEND_SECRET_KEY")
                .expect("INTASEND_SECRET_KEY must be set"),
            intasend_webhook_secret: env::var("INTASEND_WEBHOOK_SECRET")
                .expect("INTASEND_WEBHOOK_SECRET must be set"),
            settlement: SettlementConfig {
                payout_limit: env::var("PAYOUT_LIMIT")
                    .ok()
                    .and_then(|v| Decimal::from_str(&v).ok())
                    .unwrap_or(defaults.payout_limit),
                dispatch_batch_size: env::var("DISPATCH_BATCH_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.dispatch_batch_size),
                status_check_delay: env::var("STATUS_CHECK_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.status_check_delay),
                status_check_max_attempts: env::var("STATUS_CHECK_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.status_check_max_attempts),
                currency: env::var("PAYOUT_CURRENCY").unwrap_or(defaults.currency),
            },
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
