//! Data models for the device mapping engine

pub mod catalog;
pub mod mapping;
pub mod metadata;
pub mod report;

pub use catalog::{CandidateFilter, CatalogCandidate, KnowledgeEntry};
pub use mapping::{
    CandidateSummary, DecisionStep, DeviceMapping, MappingAlgorithm, MappingCandidateScore,
    MappingResult, ValidationFeedback,
};
pub use metadata::{Brand, DeviceMetadata, DeviceSignature, RawRecord};
pub use report::{
    confidence_bucket, AuditEntrySummary, BatchReport, HealthAlert, HealthLevel, HealthStatus,
    RunMetrics, RunReport, CONFIDENCE_BUCKETS,
};
