//! Command-line interface.
//!
//! Every flag can also be set through an identically-named environment
//! variable; precedence is CLI over environment over default.

use clap::{Parser, ValueEnum};
use std::time::Duration;

/// How much of the machine the sweep may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PerformanceMode {
    /// All CPU cores.
    Speed,
    /// Half the cores.
    Balanced,
    /// A quarter of the cores, for precision over throughput.
    Quality,
}

impl std::fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PerformanceMode::Speed => "speed",
            PerformanceMode::Balanced => "balanced",
            PerformanceMode::Quality => "quality",
        })
    }
}

impl PerformanceMode {
    /// Tokio worker-thread count for this mode.
    pub fn worker_threads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        match self {
            PerformanceMode::Speed => cores,
            PerformanceMode::Balanced => (cores / 2).max(1),
            PerformanceMode::Quality => (cores / 4).max(1),
        }
    }
}

/// How hard the dialer works to look unremarkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum DpiEvasionLevel {
    /// Fingerprint defaults only.
    Standard,
    /// Fingerprint rotation plus ClientHello fragmentation.
    Aggressive,
    /// Everything, plus the QUIC/UDP protocol families in synthesis.
    Maximum,
}

impl std::fmt::Display for DpiEvasionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DpiEvasionLevel::Standard => "standard",
            DpiEvasionLevel::Aggressive => "aggressive",
            DpiEvasionLevel::Maximum => "maximum",
        })
    }
}

impl DpiEvasionLevel {
    pub fn fragment_client_hello(&self) -> bool {
        *self >= DpiEvasionLevel::Aggressive
    }

    pub fn rotate_fingerprints(&self) -> bool {
        *self >= DpiEvasionLevel::Aggressive
    }
}

/// Proxy fleet evaluator and subscription config generator.
#[derive(Debug, Parser)]
#[command(name = "simurgh")]
#[command(about = "Iran-optimized proxy checker and subscription config generator")]
#[command(version)]
pub struct Args {
    /// Candidate list: one `ip,port[,country[,isp]]` per line
    #[arg(long, env = "PROXY_FILE", default_value = "assets/proxies.txt")]
    pub proxy_file: String,

    /// Markdown report output path
    #[arg(long, env = "OUTPUT_FILE", default_value = "sub/ProxyIP-Daily.md")]
    pub output_file: String,

    /// Subscription config output path (sibling dirs are created next to it)
    #[arg(long, env = "CONFIG_OUTPUT", default_value = "configs/iran-configs.txt")]
    pub config_output: String,

    /// Max concurrent probes, clamped to 50..=500
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = 100)]
    pub max_concurrent: usize,

    /// Per-probe timeout in seconds, clamped to 5..=30
    #[arg(long, env = "TIMEOUT", default_value_t = 10)]
    pub timeout: u64,

    /// Iran-specific filtering, weighting, and transport preferences
    #[arg(long, env = "IRAN_MODE", default_value_t = true, action = clap::ArgAction::Set)]
    pub iran_mode: bool,

    /// Generate subscription configs from passing endpoints
    #[arg(long, env = "GENERATE_CONFIGS", default_value_t = true, action = clap::ArgAction::Set)]
    pub generate_configs: bool,

    /// Probe generated configs before writing them
    #[arg(long, env = "TEST_CONFIGS", default_value_t = true, action = clap::ArgAction::Set)]
    pub test_configs: bool,

    /// Skip the endpoint sweep and only emit configs
    #[arg(long, env = "CONFIGS_ONLY", default_value_t = false, action = clap::ArgAction::Set)]
    pub configs_only: bool,

    /// Runtime sizing: speed, balanced, quality
    #[arg(long, env = "PERFORMANCE_MODE", value_enum, default_value_t = PerformanceMode::Balanced)]
    pub performance_mode: PerformanceMode,

    /// Evasion aggressiveness: standard, aggressive, maximum
    #[arg(long, env = "DPI_EVASION_LEVEL", value_enum, default_value_t = DpiEvasionLevel::Aggressive)]
    pub dpi_evasion_level: DpiEvasionLevel,

    /// Log post-run health advisories
    #[arg(long, env = "ENABLE_SELF_HEALING", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_self_healing: bool,

    /// Retry a fully-failed sweep once with relaxed settings
    #[arg(long, env = "EMERGENCY_MODE", default_value_t = false, action = clap::ArgAction::Set)]
    pub emergency_mode: bool,

    /// Verbose logging
    #[arg(short, long, env = "VERBOSE", default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Clamp the tunables into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.clamp(50, 500);
        self.timeout = self.timeout.clamp(5, 30);
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Args::parse_from(["simurgh"]).normalized();
        assert_eq!(args.max_concurrent, 100);
        assert_eq!(args.timeout, 10);
        assert!(args.iran_mode);
        assert_eq!(args.dpi_evasion_level, DpiEvasionLevel::Aggressive);
    }

    #[test]
    fn ranges_are_clamped() {
        let args = Args::parse_from(["simurgh", "--max-concurrent", "9999", "--timeout", "1"])
            .normalized();
        assert_eq!(args.max_concurrent, 500);
        assert_eq!(args.timeout, 5);
    }

    #[test]
    fn level_gates_evasion_layers() {
        assert!(!DpiEvasionLevel::Standard.fragment_client_hello());
        assert!(DpiEvasionLevel::Aggressive.fragment_client_hello());
        assert!(DpiEvasionLevel::Maximum.rotate_fingerprints());
    }

    #[test]
    fn flags_accept_explicit_values() {
        let args = Args::parse_from([
            "simurgh",
            "--iran-mode",
            "false",
            "--configs-only",
            "true",
            "--dpi-evasion-level",
            "maximum",
        ])
        .normalized();
        assert!(!args.iran_mode);
        assert!(args.configs_only);
        assert_eq!(args.dpi_evasion_level, DpiEvasionLevel::Maximum);
    }
}
