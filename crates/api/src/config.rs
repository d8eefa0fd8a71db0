//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; unset runs the
///   in-memory stores
/// - `OUTBOX_PUBLISH_INTERVAL_SECS` — outbox drain period (default: 3)
/// - `ORDER_TIMEOUT_SWEEP_INTERVAL_SECS` — order timeout sweep period
///   (default: 30)
/// - `RESERVATION_EXPIRY_SWEEP_INTERVAL_SECS` — reservation expiry
///   sweep period (default: 60)
/// - `RETENTION_CLEANUP_INTERVAL_SECS` — retention cleanup period
///   (default: 21600, i.e. 6h)
/// - `ORDER_PAYMENT_DEADLINE_SECS` — how long an order may sit in
///   `PAYMENT_PENDING` before the sweep cancels it (default: 900)
/// - `RESERVATION_TTL_SECS` — reservation lifetime before the expiry
///   sweep releases it (default: 1800)
/// - `OUTBOX_BATCH_SIZE` — outbox rows drained per publisher pass
///   (default: 100)
/// - `OUTBOX_MAX_RETRY` — delivery attempts before an outbox row is
///   quarantined (default: 5)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub publish_interval: Duration,
    pub timeout_sweep_interval: Duration,
    pub expiry_sweep_interval: Duration,
    pub cleanup_interval: Duration,
    pub payment_deadline: Duration,
    pub reservation_ttl: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_retry: i32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            publish_interval: secs_from_env("OUTBOX_PUBLISH_INTERVAL_SECS", 3),
            timeout_sweep_interval: secs_from_env("ORDER_TIMEOUT_SWEEP_INTERVAL_SECS", 30),
            expiry_sweep_interval: secs_from_env("RESERVATION_EXPIRY_SWEEP_INTERVAL_SECS", 60),
            cleanup_interval: secs_from_env("RETENTION_CLEANUP_INTERVAL_SECS", 6 * 60 * 60),
            payment_deadline: secs_from_env("ORDER_PAYMENT_DEADLINE_SECS", 15 * 60),
            reservation_ttl: secs_from_env("RESERVATION_TTL_SECS", 30 * 60),
            outbox_batch_size: parse_from_env("OUTBOX_BATCH_SIZE", 100),
            outbox_max_retry: parse_from_env("OUTBOX_MAX_RETRY", 5),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            publish_interval: Duration::from_secs(3),
            timeout_sweep_interval: Duration::from_secs(30),
            expiry_sweep_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(6 * 60 * 60),
            payment_deadline: Duration::from_secs(15 * 60),
            reservation_ttl: Duration::from_secs(30 * 60),
            outbox_batch_size: 100,
            outbox_max_retry: 5,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    Duration::from_secs(parse_from_env(key, default))
}

fn parse_from_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
