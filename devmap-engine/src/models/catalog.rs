//! Read-only projections of the internal catalog
//!
//! The engine never mutates catalog entries; it consumes them through the
//! `CatalogReader` trait as plain value structs.

use crate::models::Brand;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One sellable capacity entry from the internal catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCandidate {
    /// Capacity entry id (the mapping target)
    pub capacity_id: Uuid,

    /// Owning device model id
    pub model_id: Uuid,

    /// Human-readable description ("iPhone 15 Pro 256GB A3102 (2023)")
    pub description: String,

    pub brand: Brand,
    pub family: Option<String>,
    pub capacity_gb: u32,
    pub release_year: Option<u16>,
    pub screen_size_in: Option<f32>,
    pub chip: Option<String>,
    pub compute_units: Option<u8>,

    /// Catalog-side vendor model code, when curated
    pub model_code: Option<String>,

    /// Manufacturer identification codes associated with this entry
    pub identification_codes: Vec<String>,
}

impl CatalogCandidate {
    /// Case-insensitive check whether this entry carries the given code
    pub fn has_identification_code(&self, code: &str) -> bool {
        self.identification_codes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    }
}

/// Curated model/identifier association from the knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub identification_code: String,
    pub normalized_model: String,
    pub family: Option<String>,
    pub release_year: Option<u16>,
}

/// Filters for `CatalogReader::find_candidates`
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub release_year: Option<u16>,
    pub model_code: Option<String>,
    pub description_contains: Option<String>,
    /// Upper bound on returned candidates (0 = reader default)
    pub limit: usize,
}
