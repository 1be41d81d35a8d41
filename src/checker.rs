//! Sweep orchestration: input parsing, self-IP detection, dispatch, and
//! result aggregation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::DpiEvasionLevel;
use crate::error::{Error, Result};
use crate::probe::adaptive::AdaptiveController;
use crate::probe::dispatcher::{CancelSignal, Dispatcher};
use crate::probe::engine::{Endpoint, EndpointReport, ProbeEngine};
use crate::probe::targets::{ProbeMeta, TargetKind, PROBE_TARGETS};
use crate::rng::RngService;
use crate::transport::connector::EvasiveConnector;
use crate::transport::h1;

/// Providers that reliably pass Iran's filtering. Matched
/// case-insensitively as substrings of the input ISP column.
pub const IRAN_OPTIMIZED_ISPS: &[&str] = &[
    // Tier 1: CDN and major cloud
    "Cloudflare",
    "Google",
    "Amazon",
    "Akamai",
    "Fastly",
    "Microsoft",
    // Tier 2: reliable bypasses
    "M247",
    "OVH",
    "Vultr",
    "GCore",
    "IONOS",
    "Hetzner",
    "DigitalOcean",
    // Tier 3: good alternatives
    "Contabo",
    "UpCloud",
    "Tencent",
    "Multacom",
    "Leaseweb",
    "Hostinger",
    "Scaleway",
    "netcup GmbH",
    "ByteDance",
    "RackSpace",
    "SiteGround",
    // Additional reliable providers
    "Online Ltd",
    "Relink LTD",
    "PQ Hosting",
    "Gigahost AS",
    "White Label",
    "G-Core Labs",
    "3HCLOUD LLC",
    "HOSTKEY B.V",
    "3NT SOLUTION",
    "Zenlayer Inc",
    "RackNerd LLC",
    "Plant Holding",
    "WorkTitans",
    "IROKO Networks",
    "WorldStream",
    "Cluster",
    "Cogent Communications",
    "Metropolis networks inc",
    "Total Uptime Technologies",
    "NetLab",
    "Turunc",
    "HostPapa",
    "Ultahost",
    "DataCamp",
    "Bluehost",
    "Protilab",
    "DO Space",
    "The Empire",
    "The Constant Company",
];

/// Health score at or above which an endpoint counts as Iran-optimized.
pub const HEALTH_SCORE_THRESHOLD: u8 = 70;

/// Port required of candidates in Iran mode.
pub const IRAN_OPTIMIZED_PORT: u16 = 443;

/// Whether an ISP name matches the approved-provider list.
pub fn isp_is_whitelisted(isp: &str) -> bool {
    let lower = isp.to_lowercase();
    IRAN_OPTIMIZED_ISPS
        .iter()
        .any(|good| lower.contains(&good.to_lowercase()))
}

/// Sweep-wide counters. Updated atomically from probe workers.
#[derive(Default)]
pub struct CheckerStats {
    pub total_tested: AtomicU64,
    pub total_active: AtomicU64,
    pub total_failed: AtomicU64,
    pub iran_optimized: AtomicU64,
    pub dpi_evaded: AtomicU64,
    pub multi_endpoint_ok: AtomicU64,
}

/// Plain-value snapshot of the counters for reporting.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_tested: u64,
    pub total_active: u64,
    pub total_failed: u64,
    pub iran_optimized: u64,
    pub dpi_evaded: u64,
    pub multi_endpoint_ok: u64,
    pub elapsed: Duration,
}

/// Checker configuration.
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub iran_mode: bool,
    pub emergency_mode: bool,
    pub dpi_evasion_level: DpiEvasionLevel,
}

/// Runs the sweep and owns the aggregated results.
pub struct ProxyChecker {
    options: CheckerOptions,
    adaptive: Arc<AdaptiveController>,
    rng: Arc<RngService>,
    /// Country code -> reports for passing endpoints.
    active: Mutex<HashMap<String, Vec<EndpointReport>>>,
    /// Endpoint key -> consecutive failure count.
    failed: Mutex<HashMap<String, u32>>,
    stats: CheckerStats,
    self_ip: Mutex<Option<String>>,
    started_at: Instant,
}

impl ProxyChecker {
    pub fn new(options: CheckerOptions, rng: Arc<RngService>) -> Self {
        Self {
            options,
            adaptive: Arc::new(AdaptiveController::new()),
            rng,
            active: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashMap::new()),
            stats: CheckerStats::default(),
            self_ip: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    pub fn adaptive(&self) -> Arc<AdaptiveController> {
        self.adaptive.clone()
    }

    /// Parse and filter the candidate file.
    ///
    /// Lines are `ip,port[,country[,isp]]`; blanks and `#` comments are
    /// skipped, malformed lines are logged and dropped. Iran mode keeps
    /// only port-443 candidates from whitelisted providers.
    pub fn read_candidates(&self, path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::input(format!("failed to open {}: {e}", path.display())))?;

        let mut endpoints = Vec::new();
        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split(',').map(str::trim);
            let (Some(address), Some(port_text)) = (parts.next(), parts.next()) else {
                tracing::warn!(line = line_no + 1, "skipping malformed candidate line");
                continue;
            };
            let Ok(port) = port_text.parse::<u16>() else {
                tracing::warn!(line = line_no + 1, port = port_text, "skipping bad port");
                continue;
            };
            let provider_country = parts.next().unwrap_or("").to_string();
            let provider_isp = parts.next().unwrap_or("").to_string();

            if self.options.iran_mode {
                if port != IRAN_OPTIMIZED_PORT {
                    continue;
                }
                if !isp_is_whitelisted(&provider_isp) {
                    continue;
                }
            }

            endpoints.push(Endpoint {
                address: address.to_string(),
                port,
                provider_country,
                provider_isp,
            });
        }

        if endpoints.is_empty() {
            return Err(Error::input(format!(
                "no usable candidates in {}",
                path.display()
            )));
        }
        Ok(endpoints)
    }

    /// Learn our own egress IP so endpoints reflecting it back can be
    /// discarded as loopbacks.
    pub async fn detect_self_ip(&self) -> Result<String> {
        let connector = EvasiveConnector::new(self.options.timeout, self.rng.clone());

        for target in PROBE_TARGETS
            .iter()
            .filter(|t| t.kind == TargetKind::JsonMeta)
        {
            let attempt = async {
                let mut stream = connector.connect(target.host, 443, target.host).await?;
                let user_agent = stream.profile().user_agent();
                let response = h1::get(&mut stream, target.host, target.path, user_agent).await?;
                Ok::<_, Error>(response)
            };

            match tokio::time::timeout(self.options.timeout, attempt).await {
                Ok(Ok(response)) => {
                    if let Some(meta) = ProbeMeta::from_body(&response.body) {
                        if let Some(ip) = meta.client_ip.filter(|ip| !ip.is_empty()) {
                            tracing::info!(ip = %ip, via = target.host, "detected own IP");
                            *self.self_ip.lock() = Some(ip.clone());
                            return Ok(ip);
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!(target = target.host, error = %e, "self-IP probe failed")
                }
                Err(_) => tracing::debug!(target = target.host, "self-IP probe timed out"),
            }
        }

        Err(Error::connection("could not determine own IP address"))
    }

    /// Run the sweep over `endpoints`. On a fully-failed sweep with
    /// emergency mode set, retries once at half concurrency and double
    /// timeout.
    pub async fn run(&self, endpoints: Vec<Endpoint>, cancel: &CancelSignal) -> Result<StatsSnapshot> {
        self.sweep(
            endpoints.clone(),
            self.options.max_concurrent,
            self.options.timeout,
            cancel,
        )
        .await;

        let snapshot = self.stats_snapshot();
        if snapshot.total_active == 0 && !cancel.is_cancelled() {
            if !self.options.emergency_mode {
                return Err(Error::input(
                    "every endpoint failed; rerun with --emergency-mode true to retry".to_string(),
                ));
            }
            tracing::warn!("every endpoint failed; retrying with relaxed settings");
            self.sweep(
                endpoints,
                (self.options.max_concurrent / 2).max(1),
                self.options.timeout * 2,
                cancel,
            )
            .await;
        }

        Ok(self.stats_snapshot())
    }

    async fn sweep(
        &self,
        endpoints: Vec<Endpoint>,
        concurrency: usize,
        timeout: Duration,
        cancel: &CancelSignal,
    ) {
        let level = self.options.dpi_evasion_level;
        let engine = Arc::new(
            ProbeEngine::new(
                timeout,
                self.options.iran_mode,
                self.self_ip.lock().clone(),
                self.adaptive.clone(),
                self.rng.clone(),
            )
            .with_evasion(level.fragment_client_hello(), level.rotate_fingerprints()),
        );

        let dispatcher = Dispatcher::new(concurrency);
        let reports = dispatcher
            .run(endpoints, cancel, |_, endpoint| {
                let engine = engine.clone();
                let cancel = cancel.clone();
                async move { engine.probe_endpoint(&endpoint, &cancel).await }
            })
            .await;

        for (_, report) in reports {
            self.absorb(report);
        }
    }

    /// Fold one endpoint report into the aggregate state.
    fn absorb(&self, mut report: EndpointReport) {
        self.stats.total_tested.fetch_add(1, Ordering::Relaxed);

        if !report.passed(self.options.iran_mode) {
            self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
            *self
                .failed
                .lock()
                .entry(report.endpoint.key())
                .or_insert(0) += 1;
            tracing::warn!(
                endpoint = %report.endpoint.key(),
                success_rate = report.success_rate,
                loopback = report.loopback,
                "endpoint dead"
            );
            return;
        }

        report.iran_optimized = isp_is_whitelisted(&report.endpoint.provider_isp)
            && report.health_score >= HEALTH_SCORE_THRESHOLD;

        self.stats.total_active.fetch_add(1, Ordering::Relaxed);
        if report.iran_optimized {
            self.stats.iran_optimized.fetch_add(1, Ordering::Relaxed);
        }
        if report.dpi_evaded {
            self.stats.dpi_evaded.fetch_add(1, Ordering::Relaxed);
        }
        if report.multi_endpoint {
            self.stats.multi_endpoint_ok.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!(
            endpoint = %report.endpoint.key(),
            isp = %report.endpoint.provider_isp,
            latency_ms = report.mean_latency_ms,
            health = report.health_score,
            jitter_ms = format!("{:.1}", report.jitter_ms),
            stability = format!("{:.1}", report.stability),
            dpi_evaded = report.dpi_evaded,
            iran_optimized = report.iran_optimized,
            fingerprint = report.fingerprint_label.unwrap_or("-"),
            "endpoint alive"
        );

        let country = report
            .meta
            .as_ref()
            .and_then(|m| m.country.clone())
            .filter(|c| !c.is_empty())
            .or_else(|| {
                Some(report.endpoint.provider_country.clone()).filter(|c| !c.is_empty())
            })
            .unwrap_or_else(|| "XX".to_string());

        self.active.lock().entry(country).or_default().push(report);
    }

    /// Aggregated passing endpoints, keyed by country.
    pub fn active_by_country(&self) -> HashMap<String, Vec<EndpointReport>> {
        self.active.lock().clone()
    }

    /// Every passing endpoint, unordered.
    pub fn active_reports(&self) -> Vec<EndpointReport> {
        self.active.lock().values().flatten().cloned().collect()
    }

    /// Failure counts per endpoint key.
    pub fn failure_counts(&self) -> HashMap<String, u32> {
        self.failed.lock().clone()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_tested: self.stats.total_tested.load(Ordering::Relaxed),
            total_active: self.stats.total_active.load(Ordering::Relaxed),
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
            iran_optimized: self.stats.iran_optimized.load(Ordering::Relaxed),
            dpi_evaded: self.stats.dpi_evaded.load(Ordering::Relaxed),
            multi_endpoint_ok: self.stats.multi_endpoint_ok.load(Ordering::Relaxed),
            elapsed: self.started_at.elapsed(),
        }
    }
}
