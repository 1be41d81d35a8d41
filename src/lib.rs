//! # Simurgh
//!
//! Proxy fleet evaluator and subscription-config generator for heavily
//! filtered networks.
//!
//! Given a list of candidate relay endpoints, simurgh concurrently probes
//! each one against multiple reachability targets through a DPI-evading
//! dialer (browser TLS fingerprints, ClientHello fragmentation), scores
//! endpoints on latency, reliability, jitter, and inferred DPI-evasion
//! quality, synthesizes subscription configs across the common tunneling
//! protocols, probes those configs, and emits sorted, grouped output
//! files plus a status report.
//!
//! ## Architecture
//!
//! ```text
//! candidates ─► Dispatcher ─► ProbeEngine ─► FingerprintingConnector
//!                   │              │               over FragmentingStream
//!                   │              └─► HealthScorer ─► AdaptiveController
//!                   └─► passing endpoints ─► ConfigSynthesizer ─► ConfigTester
//!                                                   └─► report + subscription files
//! ```

// Core modules
pub mod checker;
pub mod cli;
pub mod error;
pub mod rng;

// Fingerprinting
pub mod fingerprint;

// DPI-evading transport
pub mod transport;

// Probing and scoring
pub mod probe;

// Config synthesis and testing
pub mod subscription;

// Output rendering
pub mod report;

// Re-exports for convenient access
pub use checker::{CheckerOptions, ProxyChecker};
pub use error::{Error, Result};
pub use fingerprint::FingerprintProfile;
pub use probe::{AdaptiveController, CancelSignal, Dispatcher, HealthScorer, ProbeEngine};
pub use rng::RngService;
pub use subscription::synthesis::ConfigSynthesizer;
pub use subscription::tester::ConfigTester;
pub use subscription::ClientConfig;
pub use transport::{EvasiveConnector, FragmentSettings, FragmentingStream};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
