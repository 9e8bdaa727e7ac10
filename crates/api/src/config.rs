//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `ADMIN_TOKEN` — bearer token for force-cleanup and order-status
///   endpoints (default: unset, which rejects all admin calls)
/// - `AVAILABILITY_TTL_SECS` — availability snapshot cache TTL (default: `30`)
/// - `CART_HORIZON_SECS` — cart reservation hold (default: `1800`)
/// - `CHECKOUT_HORIZON_SECS` — checkout reservation hold (default: `86400`)
/// - `RATE_LIMIT_MAX_ATTEMPTS` — requests per caller per window (default: `30`)
/// - `RATE_LIMIT_WINDOW_SECS` — fixed-window length (default: `60`)
/// - `SWEEP_INTERVAL_SECS` — reconciliation sweep period (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub admin_token: Option<String>,
    pub availability_ttl_secs: u64,
    pub cart_horizon_secs: i64,
    pub checkout_horizon_secs: i64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_window_secs: u64,
    pub sweep_interval_secs: u64,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            availability_ttl_secs: env_parsed("AVAILABILITY_TTL_SECS", 30),
            cart_horizon_secs: env_parsed("CART_HORIZON_SECS", 1800),
            checkout_horizon_secs: env_parsed("CHECKOUT_HORIZON_SECS", 86_400),
            rate_limit_max_attempts: env_parsed("RATE_LIMIT_MAX_ATTEMPTS", 30),
            rate_limit_window_secs: env_parsed("RATE_LIMIT_WINDOW_SECS", 60),
            sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECS", 300),
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
            admin_token: None,
            availability_ttl_secs: 30,
            cart_horizon_secs: 1800,
            checkout_horizon_secs: 86_400,
            rate_limit_max_attempts: 30,
            rate_limit_window_secs: 60,
            sweep_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.availability_ttl_secs, 30);
        assert_eq!(config.checkout_horizon_secs, 86_400);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_checkout_horizon_longer_than_cart() {
        let config = Config::default();
        assert!(config.checkout_horizon_secs > config.cart_horizon_secs);
    }
}
