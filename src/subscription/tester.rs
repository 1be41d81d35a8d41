//! Synthesized-config probing.
//!
//! No tunnel is stood up for the synthesized protocols; each config is
//! exercised by issuing the standard target GETs straight through its
//! endpoint address, with the config's transport class setting latency
//! expectations. A config whose endpoint answers fast enough, often
//! enough, passes.

use std::sync::Arc;
use std::time::Duration;

use crate::fingerprint::FingerprintProfile;
use crate::probe::dispatcher::{CancelSignal, Dispatcher};
use crate::probe::targets::{ProbeTarget, PROBE_TARGETS};
use crate::rng::RngService;
use crate::subscription::{ClientConfig, Transport};
use crate::transport::connector::EvasiveConnector;
use crate::transport::h1;

/// Latency a well-behaved relay should reach for each transport class, in
/// milliseconds. Anything two orders of magnitude past this fails the
/// config even when requests technically complete.
pub fn expected_latency_ms(transport: Transport) -> u64 {
    match transport {
        Transport::Xhttp => 30,
        Transport::Tcp => 35,
        Transport::Grpc => 40,
        Transport::H2 => 45,
        Transport::HttpUpgrade => 48,
        Transport::Ws => 50,
        Transport::Udp => 55,
        Transport::Quic => 60,
    }
}

/// Result of probing one synthesized config.
#[derive(Debug, Clone)]
pub struct TestedConfig {
    pub config: ClientConfig,
    pub passed: bool,
    pub first_latency_ms: u64,
    pub avg_latency_ms: u64,
    pub success_rate: f64,
    pub error: Option<String>,
    /// Per-target pass map, in target order.
    pub target_results: Vec<(&'static str, bool)>,
}

/// Probes config sets through the shared dispatcher.
pub struct ConfigTester {
    max_concurrent: usize,
    timeout: Duration,
    iran_mode: bool,
    rng: Arc<RngService>,
}

impl ConfigTester {
    pub fn new(
        max_concurrent: usize,
        timeout: Duration,
        iran_mode: bool,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            max_concurrent,
            timeout,
            iran_mode,
            rng,
        }
    }

    /// Iran mode exercises the full target list; otherwise the primary
    /// target alone is enough evidence.
    fn targets(&self) -> &'static [ProbeTarget] {
        if self.iran_mode {
            &PROBE_TARGETS
        } else {
            &PROBE_TARGETS[..1]
        }
    }

    /// Probe every config concurrently; returns results in completion
    /// order.
    pub async fn test_all(
        &self,
        configs: Vec<ClientConfig>,
        cancel: &CancelSignal,
    ) -> Vec<TestedConfig> {
        let total = configs.len();
        tracing::info!(total, workers = self.max_concurrent, "testing synthesized configs");

        let dispatcher = Dispatcher::with_exact_concurrency(self.max_concurrent);
        let timeout = self.timeout;
        let iran_mode = self.iran_mode;
        let targets = self.targets();
        let rng = self.rng.clone();

        let results = dispatcher
            .run(configs, cancel, move |_, config| {
                let rng = rng.clone();
                async move { test_config(config, targets, timeout, iran_mode, rng).await }
            })
            .await;

        let tested: Vec<TestedConfig> = results.into_iter().map(|(_, t)| t).collect();
        let passed = tested.iter().filter(|t| t.passed).count();
        tracing::info!(passed, total, "config testing complete");
        tested
    }
}

async fn test_config(
    config: ClientConfig,
    targets: &'static [ProbeTarget],
    timeout: Duration,
    iran_mode: bool,
    rng: Arc<RngService>,
) -> TestedConfig {
    let profile = config
        .fingerprint
        .as_deref()
        .and_then(FingerprintProfile::from_label)
        .unwrap_or_default();

    let mut target_results = Vec::with_capacity(targets.len());
    let mut latencies: Vec<u64> = Vec::new();

    for target in targets {
        let connector = EvasiveConnector::new(timeout, rng.clone()).with_profile(profile);
        let started = std::time::Instant::now();

        let attempt = async {
            let mut stream = connector
                .connect(&config.address, config.port, target.host)
                .await?;
            let response =
                h1::get(&mut stream, target.host, target.path, profile.user_agent()).await?;
            Ok::<bool, crate::error::Error>(response.is_probe_success())
        };

        let ok = matches!(
            tokio::time::timeout(timeout, attempt).await,
            Ok(Ok(true))
        );
        if ok {
            latencies.push(started.elapsed().as_millis() as u64);
        }
        target_results.push((target.url, ok));
    }

    let ok_count = target_results.iter().filter(|(_, ok)| *ok).count();
    let success_rate = ok_count as f64 / targets.len() as f64;
    let avg_latency_ms = if latencies.is_empty() {
        0
    } else {
        latencies.iter().sum::<u64>() / latencies.len() as u64
    };
    let first_latency_ms = latencies.first().copied().unwrap_or(0);

    // Transport class sets the bar: a relay answering two orders of
    // magnitude slower than its class is not worth shipping.
    let latency_ceiling = expected_latency_ms(config.transport) * 100;
    let rate_ok = if iran_mode {
        success_rate >= 0.6
    } else {
        ok_count > 0
    };
    let latency_ok = avg_latency_ms <= latency_ceiling;
    let passed = rate_ok && latency_ok;

    let error = if passed {
        None
    } else if !rate_ok {
        Some(format!("low success rate: {:.1}%", success_rate * 100.0))
    } else {
        Some(format!(
            "too slow for {}: {avg_latency_ms}ms > {latency_ceiling}ms",
            config.transport
        ))
    };

    TestedConfig {
        config,
        passed,
        first_latency_ms,
        avg_latency_ms,
        success_rate,
        error,
        target_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_expectations_order_transports() {
        assert!(expected_latency_ms(Transport::Xhttp) < expected_latency_ms(Transport::Ws));
        assert!(expected_latency_ms(Transport::Ws) < expected_latency_ms(Transport::Quic));
    }

    #[test]
    fn target_selection_follows_mode() {
        let rng = RngService::with_seed(1);
        let iran = ConfigTester::new(50, Duration::from_secs(5), true, rng.clone());
        assert_eq!(iran.targets().len(), PROBE_TARGETS.len());

        let normal = ConfigTester::new(50, Duration::from_secs(5), false, rng);
        assert_eq!(normal.targets().len(), 1);
    }
}
