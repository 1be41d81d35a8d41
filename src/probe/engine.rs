//! Single-endpoint probe orchestration.
//!
//! One engine owns one endpoint's sweep: sequential GETs against the fixed
//! target list, each through a fresh fingerprinting dialer, every outcome
//! recorded into the endpoint's scorer and fed back to the adaptive
//! controller. Per-target failures never abort the sweep; an endpoint is
//! simply dead when too few targets answered.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::fingerprint::FingerprintProfile;
use crate::probe::adaptive::AdaptiveController;
use crate::probe::dispatcher::CancelSignal;
use crate::probe::health::HealthScorer;
use crate::probe::targets::{ProbeMeta, ProbeTarget, TargetKind, PROBE_TARGETS};
use crate::rng::RngService;
use crate::transport::connector::EvasiveConnector;
use crate::transport::h1;

/// One candidate relay.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    /// ISO-2 country code from the input file, possibly empty.
    pub provider_country: String,
    /// ISP name from the input file, possibly empty.
    pub provider_isp: String,
}

impl Endpoint {
    pub fn key(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Outcome of one probe attempt against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok { elapsed_ms: u64, status: u16 },
    Timeout,
    TlsFail,
    TcpFail,
    HttpFail,
    Cancelled,
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Ok { .. } => "ok",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::TlsFail => "tls_fail",
            ProbeOutcome::TcpFail => "tcp_fail",
            ProbeOutcome::HttpFail => "http_fail",
            ProbeOutcome::Cancelled => "cancelled",
        }
    }
}

/// Result of sweeping one endpoint across all targets.
#[derive(Debug, Clone)]
pub struct EndpointReport {
    pub endpoint: Endpoint,
    pub outcomes: Vec<(&'static str, ProbeOutcome)>,
    pub success_rate: f64,
    pub first_latency_ms: u64,
    pub mean_latency_ms: u64,
    pub health_score: u8,
    pub jitter_ms: f64,
    pub stability: f64,
    pub dpi_suspected: bool,
    /// Three or more targets answered.
    pub dpi_evaded: bool,
    /// At least 75% of targets answered.
    pub multi_endpoint: bool,
    /// Profile behind the fastest successful probe.
    pub fingerprint_label: Option<&'static str>,
    pub meta: Option<ProbeMeta>,
    /// A metadata target echoed our own IP back.
    pub loopback: bool,
    /// Provider whitelisted and health over threshold; set by the checker.
    pub iran_optimized: bool,
}

impl EndpointReport {
    /// An endpoint is alive when enough targets answered and the reply was
    /// not our own address reflected back.
    pub fn passed(&self, iran_mode: bool) -> bool {
        let threshold = if iran_mode { 0.6 } else { 0.5 };
        !self.loopback && self.success_rate >= threshold
    }
}

/// Probes one endpoint against the fixed target list.
pub struct ProbeEngine {
    targets: Vec<ProbeTarget>,
    timeout: Duration,
    iran_mode: bool,
    allow_insecure: bool,
    fragment_client_hello: bool,
    rotate_fingerprints: bool,
    self_ip: Option<String>,
    adaptive: Arc<AdaptiveController>,
    rng: Arc<RngService>,
    rotation: AtomicUsize,
}

impl ProbeEngine {
    pub fn new(
        timeout: Duration,
        iran_mode: bool,
        self_ip: Option<String>,
        adaptive: Arc<AdaptiveController>,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            targets: PROBE_TARGETS.to_vec(),
            timeout,
            iran_mode,
            allow_insecure: false,
            fragment_client_hello: true,
            rotate_fingerprints: true,
            self_ip,
            adaptive,
            rng,
            rotation: AtomicUsize::new(0),
        }
    }

    /// Override the target list (tests).
    pub fn with_targets(mut self, targets: Vec<ProbeTarget>) -> Self {
        self.targets = targets;
        self
    }

    /// Disable certificate verification for this endpoint's probes.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Tune which evasion layers are active (from the DPI-evasion level).
    pub fn with_evasion(mut self, fragment_client_hello: bool, rotate_fingerprints: bool) -> Self {
        self.fragment_client_hello = fragment_client_hello;
        self.rotate_fingerprints = rotate_fingerprints;
        self
    }

    /// Run the full sweep for `endpoint`.
    pub async fn probe_endpoint(&self, endpoint: &Endpoint, cancel: &CancelSignal) -> EndpointReport {
        let mut scorer = HealthScorer::new(self.iran_mode);
        let mut outcomes = Vec::with_capacity(self.targets.len());
        let mut meta: Option<ProbeMeta> = None;
        let mut loopback = false;
        let mut first_latency_ms = 0u64;
        let mut best: Option<(u64, &'static str)> = None;

        let target_count = self.targets.len();
        for (i, target) in self.targets.clone().into_iter().enumerate() {
            if cancel.is_cancelled() {
                outcomes.push((target.url, ProbeOutcome::Cancelled));
                continue;
            }

            let profile = self.next_profile(&endpoint.address);
            let attempt = tokio::select! {
                result = self.probe_once(endpoint, &target, profile) => result,
                _ = cancel.cancelled() => Err(Error::Cancelled),
            };

            let outcome = match attempt {
                Ok(success) => {
                    if first_latency_ms == 0 {
                        first_latency_ms = success.elapsed_ms;
                    }
                    scorer.record_latency(success.elapsed_ms, Instant::now());
                    scorer.record_timings(
                        success.dns_ms,
                        success.tcp_ms,
                        success.tls_ms,
                        success.ttfb_ms,
                    );
                    self.adaptive.record(
                        &endpoint.address,
                        true,
                        profile.label(),
                        success.elapsed_ms,
                    );
                    if meta.is_none() {
                        meta = success.meta;
                    }
                    match best {
                        Some((latency, _)) if latency <= success.elapsed_ms => {}
                        _ => best = Some((success.elapsed_ms, profile.label())),
                    }
                    ProbeOutcome::Ok {
                        elapsed_ms: success.elapsed_ms,
                        status: success.status,
                    }
                }
                Err(error) => self.record_failure(
                    &mut scorer,
                    endpoint,
                    profile,
                    &error,
                    &mut loopback,
                ),
            };

            tracing::debug!(
                endpoint = %endpoint.key(),
                target = target.host,
                outcome = outcome.label(),
                fingerprint = profile.label(),
                "probe"
            );
            outcomes.push((target.url, outcome));

            if self.iran_mode && i + 1 < target_count {
                tokio::time::sleep(human_delay(&self.rng)).await;
            }
        }

        let ok_count = outcomes.iter().filter(|(_, o)| o.is_ok()).count();
        let success_rate = if target_count == 0 {
            0.0
        } else {
            ok_count as f64 / target_count as f64
        };

        let health_score = scorer.health_score();
        self.adaptive
            .mark_dpi(&endpoint.address, scorer.dpi_suspected());

        EndpointReport {
            endpoint: endpoint.clone(),
            success_rate,
            first_latency_ms,
            mean_latency_ms: scorer.mean_latency().round() as u64,
            health_score,
            jitter_ms: scorer.jitter(),
            stability: scorer.stability(),
            dpi_suspected: scorer.dpi_suspected(),
            dpi_evaded: ok_count >= 3,
            multi_endpoint: success_rate >= 0.75,
            fingerprint_label: best.map(|(_, label)| label),
            meta,
            loopback,
            iran_optimized: false,
            outcomes,
        }
    }

    /// Profile for the next probe: the host's proven best, else rotation.
    fn next_profile(&self, host: &str) -> FingerprintProfile {
        if let Some(profile) = self
            .adaptive
            .preferred_fingerprint(host)
            .and_then(FingerprintProfile::from_label)
        {
            return profile;
        }
        if !self.rotate_fingerprints {
            return FingerprintProfile::default();
        }
        let idx = self.rotation.fetch_add(1, Ordering::Relaxed);
        FingerprintProfile::ALL[idx % FingerprintProfile::ALL.len()]
    }

    fn record_failure(
        &self,
        scorer: &mut HealthScorer,
        endpoint: &Endpoint,
        profile: FingerprintProfile,
        error: &Error,
        loopback: &mut bool,
    ) -> ProbeOutcome {
        match error {
            Error::Cancelled => ProbeOutcome::Cancelled,
            // Deadlines say more about the network than about the path's
            // DPI posture: they count against the score but are not fed
            // into adaptation.
            Error::Timeout(_) => {
                scorer.record_error();
                ProbeOutcome::Timeout
            }
            Error::LoopbackReply => {
                *loopback = true;
                scorer.record_error();
                self.adaptive
                    .record(&endpoint.address, false, profile.label(), 0);
                ProbeOutcome::HttpFail
            }
            Error::Tls(_) => {
                scorer.record_error();
                self.adaptive
                    .record(&endpoint.address, false, profile.label(), 0);
                ProbeOutcome::TlsFail
            }
            Error::Connection(_) | Error::Io(_) => {
                scorer.record_error();
                self.adaptive
                    .record(&endpoint.address, false, profile.label(), 0);
                ProbeOutcome::TcpFail
            }
            _ => {
                scorer.record_error();
                self.adaptive
                    .record(&endpoint.address, false, profile.label(), 0);
                ProbeOutcome::HttpFail
            }
        }
    }

    /// One GET against one target through a fresh evasive dialer. The
    /// probe deadline covers dial, handshake, request, and response.
    async fn probe_once(
        &self,
        endpoint: &Endpoint,
        target: &ProbeTarget,
        profile: FingerprintProfile,
    ) -> crate::error::Result<ProbeSuccess> {
        let mut connector = EvasiveConnector::new(self.timeout, self.rng.clone())
            .with_profile(profile)
            .allow_insecure(self.allow_insecure);
        if self.fragment_client_hello {
            let settings = self.adaptive.settings_for(&endpoint.address);
            connector = connector.with_fragmentation(settings);
        }

        let started = Instant::now();
        let attempt = async {
            let mut stream = connector
                .connect(&endpoint.address, endpoint.port, target.host)
                .await?;
            let timings = stream.timings();
            let response =
                h1::get(&mut stream, target.host, target.path, profile.user_agent()).await?;

            if !response.is_probe_success() {
                return Err(Error::http_status(response.status, "probe rejected"));
            }

            let meta = match target.kind {
                TargetKind::JsonMeta => {
                    let meta = ProbeMeta::from_body(&response.body).ok_or_else(|| {
                        Error::http_protocol("metadata reply was not valid JSON")
                    })?;
                    let client_ip = meta.client_ip.clone().unwrap_or_default();
                    if client_ip.is_empty() {
                        return Err(Error::http_protocol("metadata reply missing clientIp"));
                    }
                    if Some(&client_ip) == self.self_ip.as_ref() {
                        return Err(Error::LoopbackReply);
                    }
                    Some(meta)
                }
                TargetKind::Reachability => None,
            };

            Ok(ProbeSuccess {
                elapsed_ms: started.elapsed().as_millis() as u64,
                status: response.status,
                dns_ms: timings.dns_ms,
                tcp_ms: timings.tcp_ms,
                tls_ms: timings.tls_ms,
                ttfb_ms: response.ttfb_ms,
                meta,
            })
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }
}

struct ProbeSuccess {
    elapsed_ms: u64,
    status: u16,
    dns_ms: u64,
    tcp_ms: u64,
    tls_ms: u64,
    ttfb_ms: u64,
    meta: Option<ProbeMeta>,
}

/// Inter-probe pause shaped like a person, not a scanner: one of a small
/// set of base pauses, ±20% noise, floored at 10 ms.
pub fn human_delay(rng: &RngService) -> Duration {
    const BASES_MS: [u64; 7] = [50, 80, 120, 150, 200, 300, 500];
    let base = *rng.pick(&BASES_MS) as f64;
    let noise = base * 0.2 * (2.0 * rng.gen_f64() - 1.0);
    let delay_ms = (base + noise).max(10.0);
    Duration::from_millis(delay_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_delay_stays_in_band() {
        let rng = RngService::with_seed(11);
        for _ in 0..500 {
            let delay = human_delay(&rng);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(600));
        }
    }

    #[test]
    fn endpoint_pass_thresholds() {
        let endpoint = Endpoint {
            address: "203.0.113.10".to_string(),
            port: 443,
            provider_country: "DE".to_string(),
            provider_isp: "Hetzner".to_string(),
        };
        let mut report = EndpointReport {
            endpoint,
            outcomes: Vec::new(),
            success_rate: 0.55,
            first_latency_ms: 0,
            mean_latency_ms: 0,
            health_score: 0,
            jitter_ms: 0.0,
            stability: 0.0,
            dpi_suspected: false,
            dpi_evaded: false,
            multi_endpoint: false,
            fingerprint_label: None,
            meta: None,
            loopback: false,
            iran_optimized: false,
        };

        assert!(report.passed(false));
        assert!(!report.passed(true));

        report.success_rate = 0.6;
        assert!(report.passed(true));

        report.loopback = true;
        assert!(!report.passed(false));
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(ProbeOutcome::Timeout.label(), "timeout");
        assert_eq!(
            ProbeOutcome::Ok {
                elapsed_ms: 10,
                status: 204
            }
            .label(),
            "ok"
        );
    }
}
