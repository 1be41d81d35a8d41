//! Concurrent probing and scoring pipeline.

pub mod adaptive;
pub mod dispatcher;
pub mod engine;
pub mod health;
pub mod targets;

pub use adaptive::{AdaptiveController, AdaptiveSnapshot, DpiSignature};
pub use dispatcher::{CancelSignal, Dispatcher};
pub use engine::{EndpointReport, ProbeEngine, ProbeOutcome};
pub use health::HealthScorer;
pub use targets::{ProbeMeta, ProbeTarget, TargetKind, PROBE_TARGETS};
