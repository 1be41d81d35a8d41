//! Adaptive feedback between probe outcomes and the evasion dialer.
//!
//! The controller learns per remote host which fragmentation parameters
//! and browser fingerprint survive the middleboxes on the path, tightening
//! when success drops and relaxing when the path proves clean. Timeouts
//! and cancellations are excluded: they say more about the network than
//! about DPI.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::transport::fragment::FragmentSettings;

/// Rolling outcome window per host.
const WINDOW_CAP: usize = 100;
/// Outcomes required before per-host adjustment starts.
const WINDOW_WARMUP: usize = 20;
/// Trailing slice evaluated on each adjustment.
const TRAILING: usize = 20;
/// Cadence of the fleet-wide adaptation pass.
const GLOBAL_ADAPT_INTERVAL: Duration = Duration::from_secs(300);

/// Inferred middlebox posture for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DpiSignature {
    #[default]
    None,
    Suspected,
}

/// Read-only view of one host's adaptive state.
#[derive(Debug, Clone)]
pub struct AdaptiveSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub best_fingerprint_label: Option<&'static str>,
    pub settings: FragmentSettings,
    pub last_success_at: Option<Instant>,
    pub inferred_dpi_signature: DpiSignature,
}

struct HostState {
    successes: u64,
    failures: u64,
    window: VecDeque<bool>,
    best_fingerprint_label: Option<&'static str>,
    settings: FragmentSettings,
    last_success_at: Option<Instant>,
    inferred_dpi_signature: DpiSignature,
}

impl HostState {
    fn new(defaults: FragmentSettings) -> Self {
        Self {
            successes: 0,
            failures: 0,
            window: VecDeque::with_capacity(WINDOW_CAP),
            best_fingerprint_label: None,
            settings: defaults,
            last_success_at: None,
            inferred_dpi_signature: DpiSignature::None,
        }
    }

    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 0.0;
        }
        self.successes as f64 / total as f64
    }

    fn trailing_rate(&self) -> f64 {
        let taken = self.window.len().min(TRAILING);
        if taken == 0 {
            return 0.0;
        }
        let hits = self.window.iter().rev().take(taken).filter(|&&s| s).count();
        hits as f64 / taken as f64
    }
}

struct Inner {
    hosts: HashMap<String, HostState>,
    defaults: FragmentSettings,
    last_global_adapt: Instant,
}

/// Per-host adaptive state keyed by remote host; one mutex per controller
/// instance serializes all mutation.
pub struct AdaptiveController {
    inner: Mutex<Inner>,
}

impl AdaptiveController {
    pub fn new() -> Self {
        Self::with_defaults(FragmentSettings::default())
    }

    pub fn with_defaults(defaults: FragmentSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                hosts: HashMap::new(),
                defaults: defaults.clamped(),
                last_global_adapt: Instant::now(),
            }),
        }
    }

    /// Fragmentation settings to dial this host with.
    pub fn settings_for(&self, host: &str) -> FragmentSettings {
        let mut inner = self.inner.lock();
        let defaults = inner.defaults;
        inner
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(defaults))
            .settings
    }

    /// Best-known fingerprint label for this host, if it has earned one.
    pub fn preferred_fingerprint(&self, host: &str) -> Option<&'static str> {
        self.inner
            .lock()
            .hosts
            .get(host)
            .and_then(|h| h.best_fingerprint_label)
    }

    /// Record one counted probe outcome. Timeouts and cancellations must
    /// not be fed here.
    pub fn record(
        &self,
        host: &str,
        success: bool,
        fingerprint_label: &'static str,
        _latency_ms: u64,
    ) {
        let mut inner = self.inner.lock();
        let defaults = inner.defaults;
        let state = inner
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(defaults));

        if success {
            state.successes += 1;
            state.last_success_at = Some(Instant::now());
        } else {
            state.failures += 1;
        }

        if state.window.len() == WINDOW_CAP {
            state.window.pop_front();
        }
        state.window.push_back(success);

        if state.window.len() >= WINDOW_WARMUP {
            let rate = state.trailing_rate();
            if rate < 0.5 {
                // Path is hostile: smaller fragments, longer gaps.
                state.settings.fragment_size = state.settings.fragment_size.saturating_sub(1).max(3);
                state.settings.delay =
                    (state.settings.delay + Duration::from_millis(1)).min(Duration::from_millis(10));
            } else if rate > 0.85 {
                state.settings.fragment_size = (state.settings.fragment_size + 1).min(8);
                state.settings.delay = state
                    .settings
                    .delay
                    .saturating_sub(Duration::from_millis(1))
                    .max(Duration::from_millis(1));
            }
        }

        if state.success_rate() > 0.5 {
            state.best_fingerprint_label = Some(fingerprint_label);
        }

        if inner.last_global_adapt.elapsed() > GLOBAL_ADAPT_INTERVAL {
            Self::global_adapt(&mut inner);
        }
    }

    /// Copy the scorer's DPI verdict onto the host.
    pub fn mark_dpi(&self, host: &str, suspected: bool) {
        let mut inner = self.inner.lock();
        let defaults = inner.defaults;
        let state = inner
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(defaults));
        state.inferred_dpi_signature = if suspected {
            DpiSignature::Suspected
        } else {
            DpiSignature::None
        };
    }

    /// Read-only snapshot of one host's state.
    pub fn snapshot(&self, host: &str) -> Option<AdaptiveSnapshot> {
        self.inner.lock().hosts.get(host).map(|h| AdaptiveSnapshot {
            successes: h.successes,
            failures: h.failures,
            best_fingerprint_label: h.best_fingerprint_label,
            settings: h.settings,
            last_success_at: h.last_success_at,
            inferred_dpi_signature: h.inferred_dpi_signature,
        })
    }

    /// Aggregate success rate across every host seen so far.
    pub fn aggregate_success_rate(&self) -> f64 {
        let inner = self.inner.lock();
        let (hits, total) = inner.hosts.values().fold((0u64, 0u64), |(h, t), s| {
            (h + s.successes, t + s.successes + s.failures)
        });
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    fn global_adapt(inner: &mut Inner) {
        let (hits, total) = inner.hosts.values().fold((0u64, 0u64), |(h, t), s| {
            (h + s.successes, t + s.successes + s.failures)
        });
        if total < 10 {
            inner.last_global_adapt = Instant::now();
            return;
        }

        let rate = hits as f64 / total as f64;
        let forced = if rate < 0.5 {
            Some(FragmentSettings {
                fragment_size: 3,
                delay: Duration::from_millis(5),
            })
        } else if rate > 0.85 {
            Some(FragmentSettings {
                fragment_size: 6,
                delay: Duration::from_millis(1),
            })
        } else {
            None
        };

        if let Some(settings) = forced {
            inner.defaults = settings;
            for state in inner.hosts.values_mut() {
                state.settings = settings;
            }
            tracing::debug!(
                success_rate = rate,
                fragment_size = settings.fragment_size,
                delay_ms = settings.delay.as_millis() as u64,
                "global adaptation forced new fragmentation settings"
            );
        }
        inner.last_global_adapt = Instant::now();
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_before_any_outcome() {
        let controller = AdaptiveController::new();
        let settings = controller.settings_for("203.0.113.1");
        assert_eq!(settings.fragment_size, 5);
        assert_eq!(settings.delay, Duration::from_millis(2));
    }

    #[test]
    fn sustained_failure_tightens() {
        let controller = AdaptiveController::new();
        for _ in 0..WINDOW_WARMUP {
            controller.record("203.0.113.2", false, "chrome120", 0);
        }
        let settings = controller.settings_for("203.0.113.2");
        assert!(settings.fragment_size < 5);
        assert!(settings.delay > Duration::from_millis(2));
    }

    #[test]
    fn tightening_floors_at_three_and_ten_ms() {
        let controller = AdaptiveController::new();
        for _ in 0..WINDOW_CAP {
            controller.record("203.0.113.3", false, "chrome120", 0);
        }
        let settings = controller.settings_for("203.0.113.3");
        assert_eq!(settings.fragment_size, 3);
        assert_eq!(settings.delay, Duration::from_millis(10));
    }

    #[test]
    fn sustained_success_loosens_with_caps() {
        let controller = AdaptiveController::new();
        for _ in 0..WINDOW_CAP {
            controller.record("203.0.113.4", true, "firefox121", 42);
        }
        let settings = controller.settings_for("203.0.113.4");
        assert_eq!(settings.fragment_size, 8);
        assert_eq!(settings.delay, Duration::from_millis(1));
    }

    #[test]
    fn best_fingerprint_needs_majority_success() {
        let controller = AdaptiveController::new();
        controller.record("203.0.113.5", false, "chrome120", 0);
        assert_eq!(controller.preferred_fingerprint("203.0.113.5"), None);

        controller.record("203.0.113.5", true, "safari17", 30);
        controller.record("203.0.113.5", true, "edge120", 30);
        assert_eq!(
            controller.preferred_fingerprint("203.0.113.5"),
            Some("edge120")
        );
    }

    #[test]
    fn snapshot_reflects_counters_and_signature() {
        let controller = AdaptiveController::new();
        controller.record("203.0.113.6", true, "chrome120", 25);
        controller.mark_dpi("203.0.113.6", true);

        let snap = controller.snapshot("203.0.113.6").unwrap();
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.inferred_dpi_signature, DpiSignature::Suspected);
        assert!(snap.last_success_at.is_some());
    }

    #[test]
    fn hosts_adapt_independently() {
        let controller = AdaptiveController::new();
        for _ in 0..WINDOW_WARMUP {
            controller.record("203.0.113.7", false, "chrome120", 0);
            controller.record("203.0.113.8", true, "chrome120", 20);
        }
        assert!(controller.settings_for("203.0.113.7").fragment_size < 5);
        assert!(controller.settings_for("203.0.113.8").fragment_size > 5);
    }
}
