//! Per-endpoint health statistics and scoring.
//!
//! One scorer per endpoint, owned by the probe engine for the duration of
//! the sweep. Latency samples and their completion instants are kept as
//! parallel ordered sequences; the composite health score folds latency,
//! stability, reliability, DPI-evasion quality, and connection-phase
//! performance into a single 0..=100 integer.

use std::time::Instant;

/// Inter-arrival variance below this, with a mean interval over 100 ms,
/// reads as rate limiting rather than organic traffic.
const INTERVAL_VARIANCE_FLOOR: f64 = 0.001;
const INTERVAL_MEAN_FLOOR_SECS: f64 = 0.1;

/// Accumulated metrics for one endpoint.
pub struct HealthScorer {
    iran_mode: bool,
    latencies: Vec<f64>,
    timestamps: Vec<Instant>,
    error_count: u32,
    dns_ms: u64,
    tcp_ms: u64,
    tls_ms: u64,
    ttfb_ms: u64,
    dpi_suspicion: bool,
}

impl HealthScorer {
    pub fn new(iran_mode: bool) -> Self {
        Self {
            iran_mode,
            latencies: Vec::new(),
            timestamps: Vec::new(),
            error_count: 0,
            dns_ms: 0,
            tcp_ms: 0,
            tls_ms: 0,
            ttfb_ms: 0,
            dpi_suspicion: false,
        }
    }

    /// Append one successful sample. Keeps `latencies` and `timestamps`
    /// in lockstep.
    pub fn record_latency(&mut self, latency_ms: u64, at: Instant) {
        self.latencies.push(latency_ms as f64);
        self.timestamps.push(at);
        debug_assert_eq!(self.latencies.len(), self.timestamps.len());
    }

    /// Overwrite the single-sample connection timing breakdown.
    pub fn record_timings(&mut self, dns_ms: u64, tcp_ms: u64, tls_ms: u64, ttfb_ms: u64) {
        self.dns_ms = dns_ms;
        self.tcp_ms = tcp_ms;
        self.tls_ms = tls_ms;
        self.ttfb_ms = ttfb_ms;
    }

    /// Count one failed attempt.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn sample_count(&self) -> usize {
        self.latencies.len()
    }

    pub fn attempt_count(&self) -> u32 {
        self.latencies.len() as u32 + self.error_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Failed attempts over all attempts.
    pub fn error_rate(&self) -> f64 {
        let attempts = self.attempt_count();
        if attempts == 0 {
            return 0.0;
        }
        self.error_count as f64 / attempts as f64
    }

    pub fn mean_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    pub fn median_latency(&self) -> f64 {
        percentile_of(&self.latencies, 50)
    }

    pub fn p95_latency(&self) -> f64 {
        percentile_of(&self.latencies, 95)
    }

    /// Population standard deviation of the latency samples; zero below
    /// two samples.
    pub fn jitter(&self) -> f64 {
        if self.latencies.len() < 2 {
            return 0.0;
        }
        let mean = self.mean_latency();
        let variance = self
            .latencies
            .iter()
            .map(|l| (l - mean) * (l - mean))
            .sum::<f64>()
            / self.latencies.len() as f64;
        variance.sqrt()
    }

    /// Connection stability, 0..=100. Neutral 50 below three samples.
    pub fn stability(&self) -> f64 {
        if self.latencies.len() < 3 {
            return 50.0;
        }

        let jitter = self.jitter();
        let mean = self.mean_latency();

        let jitter_score = if mean > 0.0 {
            100.0 * (1.0 - (jitter / mean).min(1.0))
        } else {
            100.0
        };
        let error_score = 100.0 * (1.0 - self.error_rate());
        let consistency_score = self.consistency_score();

        jitter_score * 0.4 + error_score * 0.4 + consistency_score * 0.2
    }

    /// Coefficient-of-variation score; zero mean with samples present
    /// scores zero.
    fn consistency_score(&self) -> f64 {
        if self.latencies.len() < 3 {
            return 50.0;
        }
        let mean = self.mean_latency();
        if mean == 0.0 {
            return 0.0;
        }
        let cv = self.jitter() / mean;
        100.0 * (1.0 - cv.min(1.0))
    }

    /// Exponential-decay latency score; a sub-50 ms mean is a perfect 100.
    pub fn latency_score(&self) -> f64 {
        let mean = self.mean_latency();
        if mean < 50.0 {
            return 100.0;
        }
        100.0 * (-mean / 500.0).exp()
    }

    /// Whether the sample stream carries a DPI interference signature.
    pub fn dpi_suspected(&self) -> bool {
        self.dpi_suspicion
    }

    /// DPI-evasion quality. Slow TLS handshakes, throttling-shaped sample
    /// streams, and machine-regular inter-arrival times all read as
    /// middlebox interference.
    pub fn dpi_evasion_score(&mut self) -> f64 {
        let mut score = 100.0;

        if self.tls_ms > 3000 {
            score -= 30.0;
        } else if self.tls_ms > 1500 {
            score -= 15.0;
        } else if self.tls_ms > 1000 {
            score -= 5.0;
        }

        if self.stability() > 80.0 {
            score += 10.0;
        }

        let mean = self.mean_latency();
        let jitter = self.jitter();
        if mean > 0.0 && jitter > 0.0 {
            let ratio = jitter / mean;
            if ratio > 0.5 {
                score -= 20.0 * ratio;
            }
        }

        if self.detect_dpi_patterns() {
            self.dpi_suspicion = true;
            score -= 25.0;
        }

        score.max(0.0)
    }

    /// Spike, throttling-band, and timing-regularity heuristics.
    fn detect_dpi_patterns(&self) -> bool {
        if self.latencies.len() >= 5 {
            let mean = self.mean_latency();
            if self.latencies.iter().any(|&l| l > mean * 3.0) {
                return true;
            }

            if self.latencies.len() >= 10 {
                let slow = self.latencies.iter().filter(|&&l| l > mean * 1.5).count();
                let ratio = slow as f64 / self.latencies.len() as f64;
                if ratio > 0.3 && ratio < 0.7 {
                    return true;
                }
            }
        }

        self.detect_timing_regularity()
    }

    fn detect_timing_regularity(&self) -> bool {
        if self.timestamps.len() < 4 {
            return false;
        }

        let intervals: Vec<f64> = self
            .timestamps
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs_f64())
            .collect();

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance = intervals
            .iter()
            .map(|iv| (iv - mean) * (iv - mean))
            .sum::<f64>()
            / intervals.len() as f64;

        variance < INTERVAL_VARIANCE_FLOOR && mean > INTERVAL_MEAN_FLOOR_SECS
    }

    /// Connection-phase performance from the single timing breakdown.
    pub fn performance_score(&self) -> f64 {
        let mut score: f64 = 100.0;

        if self.dns_ms > 500 {
            score -= 15.0;
        } else if self.dns_ms > 200 {
            score -= 5.0;
        }

        if self.tcp_ms > 1000 {
            score -= 15.0;
        } else if self.tcp_ms > 500 {
            score -= 5.0;
        }

        if self.ttfb_ms > 2000 {
            score -= 20.0;
        } else if self.ttfb_ms > 1000 {
            score -= 10.0;
        }

        score.max(0.0)
    }

    pub fn reliability_score(&self) -> f64 {
        100.0 * (1.0 - self.error_rate())
    }

    /// Weighted composite in 0..=100; zero without any successful sample.
    pub fn health_score(&mut self) -> u8 {
        if self.latencies.is_empty() {
            return 0;
        }

        let latency = self.latency_score();
        let stability = self.stability();
        let reliability = self.reliability_score();
        let dpi = self.dpi_evasion_score();
        let performance = self.performance_score();

        // Iran mode shifts weight from latency/stability onto DPI evasion.
        let (w_latency, w_stability, w_reliability, w_dpi, w_performance) = if self.iran_mode {
            (0.20, 0.20, 0.20, 0.30, 0.10)
        } else {
            (0.25, 0.25, 0.20, 0.20, 0.10)
        };

        let mut score = latency * w_latency
            + stability * w_stability
            + reliability * w_reliability
            + dpi * w_dpi
            + performance * w_performance;

        if self.mean_latency() < 100.0 && stability > 90.0 {
            score += 5.0;
        }
        if self.error_rate() > 0.2 {
            score *= 0.7;
        }
        if self.iran_mode {
            if !self.dpi_suspicion && stability > 75.0 {
                score += 10.0;
            }
            if self.dpi_suspicion {
                score *= 0.8;
            }
        }

        score.round().clamp(0.0, 100.0) as u8
    }
}

fn percentile_of(values: &[f64], percentile: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if percentile == 50 && sorted.len() % 2 == 0 {
        let mid = sorted.len() / 2;
        return (sorted[mid - 1] + sorted[mid]) / 2.0;
    }
    let index = ((sorted.len() * percentile).div_ceil(100)).saturating_sub(1);
    sorted[index.min(sorted.len() - 1)]
}
