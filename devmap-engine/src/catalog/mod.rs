//! Catalog and knowledge-base read interfaces
//!
//! **[DME-CAT-010]** The engine consumes the internal catalog strictly through
//! these traits as plain value structs; all filtering and scoring happens in
//! the engine, never in a query builder. For batch runs the collaborator data
//! is loaded once into the in-memory indexes below, removing the store as a
//! contention point.

use crate::models::{Brand, CandidateFilter, CatalogCandidate, KnowledgeEntry};
use std::collections::HashMap;
use thiserror::Error;

/// Catalog access errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The collaborator is unreachable; the pipeline skips the affected
    /// strategy and continues
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only catalog access
pub trait CatalogReader: Send + Sync {
    /// Candidates for a device family, optionally filtered
    fn find_candidates(
        &self,
        brand: Brand,
        family: Option<&str>,
        filter: &CandidateFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError>;

    /// Candidates carrying the given identification code
    fn find_by_identifier(&self, code: &str) -> Result<Vec<CatalogCandidate>, CatalogError>;
}

/// Read-only knowledge base access (curated model/identifier associations)
pub trait KnowledgeBaseReader: Send + Sync {
    fn lookup(&self, identification_code: &str) -> Result<Option<KnowledgeEntry>, CatalogError>;
}

/// In-memory catalog index, built once per batch run
pub struct InMemoryCatalog {
    entries: Vec<CatalogCandidate>,
    by_code: HashMap<String, Vec<usize>>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogCandidate>) -> Self {
        let mut by_code: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for code in &entry.identification_codes {
                by_code.entry(code.to_uppercase()).or_default().push(idx);
            }
        }
        Self { entries, by_code }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogReader for InMemoryCatalog {
    fn find_candidates(
        &self,
        brand: Brand,
        family: Option<&str>,
        filter: &CandidateFilter,
    ) -> Result<Vec<CatalogCandidate>, CatalogError> {
        let limit = if filter.limit == 0 { 100 } else { filter.limit };
        let needle = filter
            .description_contains
            .as_ref()
            .map(|s| s.to_lowercase());

        let mut out = Vec::new();
        for entry in &self.entries {
            if brand != Brand::Unknown && entry.brand != brand {
                continue;
            }
            if let Some(family) = family {
                if entry.family.as_deref() != Some(family) {
                    continue;
                }
            }
            if let Some(year) = filter.release_year {
                if entry.release_year != Some(year) {
                    continue;
                }
            }
            if let Some(code) = &filter.model_code {
                if entry.model_code.as_deref() != Some(code.as_str()) {
                    continue;
                }
            }
            if let Some(needle) = &needle {
                if !entry.description.to_lowercase().contains(needle) {
                    continue;
                }
            }
            out.push(entry.clone());
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn find_by_identifier(&self, code: &str) -> Result<Vec<CatalogCandidate>, CatalogError> {
        Ok(self
            .by_code
            .get(&code.to_uppercase())
            .map(|indices| indices.iter().map(|&i| self.entries[i].clone()).collect())
            .unwrap_or_default())
    }
}

/// In-memory knowledge base index
#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    by_code: HashMap<String, KnowledgeEntry>,
}

impl InMemoryKnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            by_code: entries
                .into_iter()
                .map(|e| (e.identification_code.to_uppercase(), e))
                .collect(),
        }
    }
}

impl KnowledgeBaseReader for InMemoryKnowledgeBase {
    fn lookup(&self, identification_code: &str) -> Result<Option<KnowledgeEntry>, CatalogError> {
        Ok(self.by_code.get(&identification_code.to_uppercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) fn candidate(
        description: &str,
        brand: Brand,
        family: &str,
        capacity_gb: u32,
        codes: &[&str],
    ) -> CatalogCandidate {
        CatalogCandidate {
            capacity_id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            description: description.to_string(),
            brand,
            family: Some(family.to_string()),
            capacity_gb,
            release_year: None,
            screen_size_in: None,
            chip: None,
            compute_units: None,
            model_code: None,
            identification_codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_find_by_identifier_case_insensitive() {
        let catalog = InMemoryCatalog::new(vec![candidate(
            "iPhone 15 Pro 256GB",
            Brand::Apple,
            "iphone",
            256,
            &["A3102"],
        )]);
        assert_eq!(catalog.find_by_identifier("a3102").unwrap().len(), 1);
        assert_eq!(catalog.find_by_identifier("A9999").unwrap().len(), 0);
    }

    #[test]
    fn test_find_candidates_family_filter() {
        let catalog = InMemoryCatalog::new(vec![
            candidate("iPhone 15 256GB", Brand::Apple, "iphone", 256, &[]),
            candidate("iPad Air 256GB", Brand::Apple, "ipad air", 256, &[]),
        ]);
        let found = catalog
            .find_candidates(Brand::Apple, Some("iphone"), &CandidateFilter::default())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].family.as_deref(), Some("iphone"));
    }

    #[test]
    fn test_find_candidates_limit() {
        let entries = (0..10)
            .map(|i| candidate(&format!("Model {}", i), Brand::Apple, "iphone", 128, &[]))
            .collect();
        let catalog = InMemoryCatalog::new(entries);
        let filter = CandidateFilter {
            limit: 3,
            ..Default::default()
        };
        let found = catalog
            .find_candidates(Brand::Apple, Some("iphone"), &filter)
            .unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_unknown_brand_searches_all() {
        let catalog = InMemoryCatalog::new(vec![
            candidate("iPhone 15 256GB", Brand::Apple, "iphone", 256, &[]),
            candidate("Galaxy S24 256GB", Brand::Samsung, "galaxy", 256, &[]),
        ]);
        let found = catalog
            .find_candidates(Brand::Unknown, None, &CandidateFilter::default())
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_knowledge_base_lookup() {
        let kb = InMemoryKnowledgeBase::new(vec![KnowledgeEntry {
            identification_code: "A2779".to_string(),
            normalized_model: "macbook pro 14".to_string(),
            family: Some("macbook pro".to_string()),
            release_year: Some(2023),
        }]);
        let entry = kb.lookup("a2779").unwrap().unwrap();
        assert_eq!(entry.normalized_model, "macbook pro 14");
        assert!(kb.lookup("A0000").unwrap().is_none());
    }
}
