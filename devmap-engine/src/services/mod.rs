//! Engine services
//!
//! The resolution pipeline and the batch machinery around it.

pub mod batch_runner;
pub mod candidate_scorer;
pub mod change_detector;
pub mod health_monitor;
pub mod heuristics;
pub mod resolution_pipeline;

pub use batch_runner::{BatchOptions, BatchRunner};
pub use candidate_scorer::CandidateScorer;
pub use change_detector::{ChangeDetector, ChangeSet};
pub use health_monitor::HealthMonitor;
pub use resolution_pipeline::{ResolutionPipeline, ResolveOptions};
