//! Configuration module for the order book client

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the matching engine
    pub server_url: String,

    /// Protocol version token sent in `Sec-WebSocket-Protocol`
    pub protocol_version: String,

    /// Trading pairs to follow (e.g., ["XSN_BTC", "LTC_BTC"])
    pub trading_pairs: Vec<String>,

    /// Fixed delay between reconnection attempts
    pub reconnect_delay_ms: u64,

    /// Keepalive ping interval while connected
    pub heartbeat_interval_secs: u64,

    /// Default timeout for correlated requests
    pub request_timeout_ms: u64,

    /// Number of most recent trades kept per book
    pub trade_history_len: usize,

    /// Capacity of the inbound event broadcast channel
    pub event_channel_capacity: usize,

    /// Reject pending requests as soon as the connection drops
    pub fail_pending_on_disconnect: bool,

    /// Port for the health/metrics HTTP server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let trading_pairs: Vec<String> = env::var("TRADING_PAIRS")
            .unwrap_or_else(|_| defaults.trading_pairs.join(","))
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        if trading_pairs.is_empty() {
            anyhow::bail!("TRADING_PAIRS must name at least one trading pair");
        }

        Ok(Self {
            server_url: env::var("SERVER_URL").unwrap_or(defaults.server_url),
            protocol_version: env::var("PROTOCOL_VERSION").unwrap_or(defaults.protocol_version),
            trading_pairs,
            reconnect_delay_ms: parse_var("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            heartbeat_interval_secs: parse_var(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            trade_history_len: parse_var("TRADE_HISTORY_LEN", defaults.trade_history_len),
            event_channel_capacity: parse_var(
                "EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            ),
            fail_pending_on_disconnect: parse_var(
                "FAIL_PENDING_ON_DISCONNECT",
                defaults.fail_pending_on_disconnect,
            ),
            health_port: parse_var("HEALTH_PORT", defaults.health_port),
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:9000/ws".to_string(),
            protocol_version: "100".to_string(),
            trading_pairs: vec!["XSN_BTC".to_string()],
            reconnect_delay_ms: 500,
            heartbeat_interval_secs: 60,
            request_timeout_ms: 60_000,
            trade_history_len: 20,
            event_channel_capacity: 4096,
            fail_pending_on_disconnect: true,
            health_port: 9090,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = Config::default();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        env::set_var("ORDERBOOK_CLIENT_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_var("ORDERBOOK_CLIENT_TEST_GARBAGE", 7u64), 7);
        env::set_var("ORDERBOOK_CLIENT_TEST_GARBAGE", " 42 ");
        assert_eq!(parse_var("ORDERBOOK_CLIENT_TEST_GARBAGE", 7u64), 42);
        env::remove_var("ORDERBOOK_CLIENT_TEST_GARBAGE");
    }
}
