//! Simplification-by-acceleration-and-chaining engine for integer
//! transition systems.
//!
//! The driver ([`analysis::analyze`]) reduces the rule graph with
//! pruning, simple-loop acceleration ([`accel`], backed by the metering
//! search in [`meter`]) and chaining ([`chain`]) until only rules leaving
//! the initial location remain, then asks the asymptotic prover
//! ([`asymptotic`]) for the complexity of each survivor and reports the
//! maximum. Soft and hard time budgets are polled at every labeled
//! checkpoint; an expired soft budget routes into the partial-result
//! extraction instead of failing.

pub mod accel;
pub mod analysis;
pub mod asymptotic;
pub mod chain;
pub mod farkas;
pub mod meter;
pub mod preprocess;
pub mod proof;
pub mod prune;
pub mod settings;
pub mod timeout;

pub use analysis::{analyze, analyze_with_timeouts, AnalysisOutcome};
pub use asymptotic::{determine_complexity, AsymptoticResult};
pub use settings::AnalysisSettings;
pub use timeout::Timeouts;
