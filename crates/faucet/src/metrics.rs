//! Prometheus metrics for the faucet

use prometheus::{
    histogram_opts, opts, Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::debug;

/// Outcome label values for `kol_faucet_requests_total`
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const INVALID: &str = "invalid";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone)]
pub struct FaucetMetrics {
    registry: Registry,

    pub requests_total: IntCounterVec,
    pub token_sends_total: IntCounterVec,
    pub send_failures_total: IntCounter,
    pub disbursement_duration: Histogram,
}

impl FaucetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            opts!("kol_faucet_requests_total", "Faucet requests by outcome"),
            &["outcome"],
        )?;

        let token_sends_total = IntCounterVec::new(
            opts!("kol_faucet_token_sends_total", "Token transfers submitted"),
            &["token"],
        )?;

        let send_failures_total = IntCounter::with_opts(opts!(
            "kol_faucet_send_failures_total",
            "Token transfers that failed before submission completed"
        ))?;

        let disbursement_duration = Histogram::with_opts(histogram_opts!(
            "kol_faucet_disbursement_duration_seconds",
            "Time spent disbursing tokens for one request",
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(token_sends_total.clone()))?;
        registry.register(Box::new(send_failures_total.clone()))?;
        registry.register(Box::new(disbursement_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            token_sends_total,
            send_failures_total,
            disbursement_duration,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_send(&self, token: &str) {
        self.token_sends_total.with_label_values(&[token]).inc();
    }

    pub fn record_send_failure(&self) {
        self.send_failures_total.inc();
    }

    pub fn record_disbursement(&self, elapsed: Duration) {
        self.disbursement_duration.observe(elapsed.as_secs_f64());
        debug!("Disbursement took {:?}", elapsed);
    }

    /// Text exposition of every registered metric
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_values() {
        let metrics = FaucetMetrics::new().unwrap();
        metrics.record_request(outcome::SUCCESS);
        metrics.record_request(outcome::RATE_LIMITED);
        metrics.record_send("KOLTEST1");
        metrics.record_disbursement(Duration::from_millis(1500));

        let text = metrics.gather().unwrap();
        assert!(text.contains(r#"kol_faucet_requests_total{outcome="success"} 1"#));
        assert!(text.contains(r#"kol_faucet_requests_total{outcome="rate_limited"} 1"#));
        assert!(text.contains(r#"kol_faucet_token_sends_total{token="KOLTEST1"} 1"#));
        assert!(text.contains("kol_faucet_disbursement_duration_seconds_count 1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = FaucetMetrics::new().unwrap();
        let b = FaucetMetrics::new().unwrap();
        a.record_send_failure();
        assert_eq!(a.send_failures_total.get(), 1);
        assert_eq!(b.send_failures_total.get(), 0);
    }
}
