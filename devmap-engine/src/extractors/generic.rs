//! Generic fallback extractor
//!
//! Handles brands without dedicated field conventions. Only the universally
//! parseable fields are filled (capacity, normalized model name), so records
//! landing here carry a low extraction confidence by construction.

use crate::extractors::{
    classify_brand, detect_family, extraction_confidence, parsers, BrandExtractor, FIELD_CAPACITY,
    FIELD_MODEL, FIELD_NAME,
};
use crate::models::{Brand, DeviceMetadata, RawRecord};

#[derive(Debug, Default)]
pub struct GenericExtractor;

impl BrandExtractor for GenericExtractor {
    fn brand(&self) -> Brand {
        Brand::Unknown
    }

    fn extract(&self, record: &RawRecord) -> DeviceMetadata {
        let mut issues = Vec::new();

        let raw_model = record
            .field_str(FIELD_MODEL)
            .or_else(|| record.field_str(FIELD_NAME))
            .unwrap_or_else(|| {
                issues.push("missing model field".to_string());
                String::new()
            });

        let capacity_gb = record
            .field_str(FIELD_CAPACITY)
            .as_deref()
            .and_then(parsers::parse_capacity_gb)
            .or_else(|| parsers::parse_capacity_gb(&raw_model));
        if capacity_gb.is_none() {
            issues.push("capacity not parseable".to_string());
        }

        let normalized_model = if raw_model.is_empty() {
            None
        } else {
            Some(parsers::normalize_model_name(&raw_model))
        };

        let mut meta = DeviceMetadata {
            brand: classify_brand(record),
            family: detect_family(&raw_model),
            raw_model,
            normalized_model,
            capacity_gb,
            identification_code: None,
            screen_size_in: None,
            release_year: None,
            chip: None,
            compute_units: None,
            vendor_model_code: Some(record.vendor_key.clone()),
            extraction_confidence: 0,
            extraction_issues: issues,
            extra_fields: record.fields.clone(),
        };
        meta.extraction_confidence = extraction_confidence(&meta);
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn record(model: &str, capacity: Option<&str>) -> RawRecord {
        let mut fields = HashMap::new();
        fields.insert("model".to_string(), json!(model));
        if let Some(c) = capacity {
            fields.insert("capacity".to_string(), json!(c));
        }
        RawRecord {
            vendor_key: "VX-7".to_string(),
            brand_hint: None,
            fields,
        }
    }

    #[test]
    fn test_unknown_brand_tb_capacity() {
        let rec = record("Frobnicator Ultra", Some("1 TB"));
        let meta = GenericExtractor.extract(&rec);

        assert_eq!(meta.brand, Brand::Unknown);
        assert_eq!(meta.capacity_gb, Some(1024));
        assert_eq!(meta.normalized_model.as_deref(), Some("frobnicator ultra"));
        assert!(meta.identification_code.is_none());
        // Only two of three high-value fields populated, nothing else
        assert!(meta.extraction_confidence < 60);
    }

    #[test]
    fn test_samsung_routed_brand_preserved() {
        let rec = record("Galaxy S24 Ultra 512GB", None);
        let meta = GenericExtractor.extract(&rec);
        assert_eq!(meta.brand, Brand::Samsung);
        assert_eq!(meta.capacity_gb, Some(512));
        assert_eq!(meta.family.as_deref(), Some("galaxy"));
    }

    #[test]
    fn test_empty_record_low_confidence() {
        let rec = RawRecord {
            vendor_key: "VX-8".to_string(),
            brand_hint: None,
            fields: HashMap::new(),
        };
        let meta = GenericExtractor.extract(&rec);
        assert!(meta.raw_model.is_empty());
        assert_eq!(meta.extraction_confidence, 0);
        assert_eq!(meta.extraction_issues.len(), 2);
    }
}
