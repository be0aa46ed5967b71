//! Prometheus metrics for the client
//!
//! Each client owns its own registry so several clients (and tests) can live
//! in one process.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ClientMetrics {
    registry: Registry,
    pub frames_received: IntCounter,
    pub frames_sent: IntCounter,
    pub decode_failures: IntCounter,
    pub connections: IntCounter,
    pub connected: IntGauge,
    pub requests: IntCounterVec,
    pub book_updates: IntCounter,
    pub missing_levels: IntCounter,
}

impl ClientMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("orderbook_client".to_string()), None)?;

        let frames_received = IntCounter::new("frames_received_total", "Inbound frames")?;
        let frames_sent = IntCounter::new("frames_sent_total", "Outbound frames")?;
        let decode_failures =
            IntCounter::new("decode_failures_total", "Inbound frames dropped as undecodable")?;
        let connections = IntCounter::new("connections_total", "Successful channel opens")?;
        let connected = IntGauge::new("connected", "1 while the session is connected")?;
        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Correlated requests by outcome"),
            &["outcome"],
        )?;
        let book_updates = IntCounter::new("book_updates_total", "Events applied to a book")?;
        let missing_levels = IntCounter::new(
            "missing_levels_total",
            "Reductions that found no level at the price",
        )?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(frames_sent.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(connected.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(book_updates.clone()))?;
        registry.register(Box::new(missing_levels.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            frames_sent,
            decode_failures,
            connections,
            connected,
            requests,
            book_updates,
            missing_levels,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ClientError::MetricsError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_prefixed_names() {
        let metrics = ClientMetrics::new().unwrap();
        metrics.frames_received.inc();
        metrics.record_request("timeout");

        let text = metrics.encode().unwrap();
        assert!(text.contains("orderbook_client_frames_received_total 1"));
        assert!(text.contains("orderbook_client_requests_total{outcome=\"timeout\"} 1"));
    }

    #[test]
    fn test_independent_registries() {
        let a = ClientMetrics::new().unwrap();
        let b = ClientMetrics::new().unwrap();
        a.connections.inc();
        assert_eq!(a.connections.get(), 1);
        assert_eq!(b.connections.get(), 0);
    }
}
