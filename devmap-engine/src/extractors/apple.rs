//! Apple-family extractor
//!
//! **[DME-EXT-040]** Knows Apple feed conventions: the "master_model" field
//! carries the identification code when present and takes priority over the
//! model name; chips come from the M-/A-series vocabulary; GPU core counts
//! disambiguate same-code configurations.

use crate::extractors::{
    detect_family, extraction_confidence, parsers, BrandExtractor, FIELD_CAPACITY, FIELD_CPU,
    FIELD_MASTER_MODEL, FIELD_MODEL, FIELD_NAME, FIELD_SCREEN, FIELD_YEAR,
};
use crate::models::{Brand, DeviceMetadata, RawRecord};

#[derive(Debug, Default)]
pub struct AppleExtractor;

impl BrandExtractor for AppleExtractor {
    fn brand(&self) -> Brand {
        Brand::Apple
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

        // Identification code: dedicated master-model field first, then the
        // model name itself
        let identification_code = record
            .field_str(FIELD_MASTER_MODEL)
            .as_deref()
            .and_then(parsers::parse_identification_code)
            .or_else(|| parsers::parse_identification_code(&raw_model));
        if identification_code.is_none() {
            issues.push("no identification code found".to_string());
        }

        // Capacity: dedicated field first, then the model name
        let capacity_gb = record
            .field_str(FIELD_CAPACITY)
            .as_deref()
            .and_then(parsers::parse_capacity_gb)
            .or_else(|| parsers::parse_capacity_gb(&raw_model));
        if capacity_gb.is_none() {
            issues.push("capacity not parseable".to_string());
        }

        let year_text = record.field_str(FIELD_YEAR).unwrap_or_default();
        let release_year = parsers::parse_year(&year_text)
            .or_else(|| parsers::parse_year(&raw_model));
        if release_year.is_none() {
            issues.push("release year not found".to_string());
        }

        let screen_text = record.field_str(FIELD_SCREEN).unwrap_or_default();
        let screen_size_in = parsers::parse_screen_size(&screen_text)
            .or_else(|| parsers::parse_screen_size(&raw_model));
        if screen_size_in.is_none() {
            issues.push("screen size not found".to_string());
        }

        let cpu_text = record.field_str(FIELD_CPU).unwrap_or_default();
        let chip = parsers::parse_chip(&cpu_text).or_else(|| parsers::parse_chip(&raw_model));
        if chip.is_none() {
            issues.push("chip not found".to_string());
        }

        let compute_units = parsers::parse_compute_units(&cpu_text)
            .or_else(|| parsers::parse_compute_units(&raw_model));
        if compute_units.is_none() {
            issues.push("gpu core count not found".to_string());
        }

        let normalized_model = if raw_model.is_empty() {
            None
        } else {
            Some(parsers::normalize_model_name(&raw_model))
        };

        let family = detect_family(&raw_model)
            .or_else(|| record.field_str(crate::extractors::FIELD_CATEGORY).as_deref().and_then(detect_family));

        let mut meta = DeviceMetadata {
            brand: Brand::Apple,
            family,
            raw_model,
            normalized_model,
            capacity_gb,
            identification_code,
            screen_size_in,
            release_year,
            chip,
            compute_units,
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

    fn record(fields: &[(&str, serde_json::Value)]) -> RawRecord {
        RawRecord {
            vendor_key: "VX-42".to_string(),
            brand_hint: Some("Apple".to_string()),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_full_record_extraction() {
        let rec = record(&[
            ("model", json!("MacBook Pro 14 M2 Pro 512GB 2023")),
            ("master_model", json!("A2779")),
            ("capacity", json!("512GB")),
            ("screen", json!("14.2\"")),
            ("cpu", json!("M2 Pro 10-core GPU")),
        ]);
        let meta = AppleExtractor.extract(&rec);

        assert_eq!(meta.brand, Brand::Apple);
        assert_eq!(meta.family.as_deref(), Some("macbook pro"));
        assert_eq!(meta.identification_code.as_deref(), Some("A2779"));
        assert_eq!(meta.capacity_gb, Some(512));
        assert_eq!(meta.screen_size_in, Some(14.2));
        assert_eq!(meta.chip.as_deref(), Some("M2 Pro"));
        assert_eq!(meta.compute_units, Some(10));
        assert_eq!(meta.release_year, Some(2023));
        assert!(meta.extraction_issues.is_empty());
        assert!(meta.extraction_confidence >= 90);
    }

    #[test]
    fn test_master_model_priority_over_model_name() {
        // Model name carries a different code; the dedicated field wins
        let rec = record(&[
            ("model", json!("MacBook Air A2337 256GB")),
            ("master_model", json!("A2681")),
        ]);
        let meta = AppleExtractor.extract(&rec);
        assert_eq!(meta.identification_code.as_deref(), Some("A2681"));
    }

    #[test]
    fn test_malformed_record_never_errors() {
        let rec = record(&[("capacity", json!("lots"))]);
        let meta = AppleExtractor.extract(&rec);

        assert!(meta.normalized_model.is_none());
        assert!(meta.capacity_gb.is_none());
        assert!(meta.identification_code.is_none());
        // Every absent field leaves its own note
        assert!(meta
            .extraction_issues
            .iter()
            .any(|i| i.contains("capacity")));
        assert!(meta.extraction_issues.iter().any(|i| i.contains("chip")));
        assert!(meta
            .extraction_issues
            .iter()
            .any(|i| i.contains("release year")));
        assert!(meta
            .extraction_issues
            .iter()
            .any(|i| i.contains("screen size")));
        assert!(meta.extraction_confidence < 40);
    }

    #[test]
    fn test_capacity_from_model_name_fallback() {
        let rec = record(&[("model", json!("iPhone 15 Pro 1TB A3102"))]);
        let meta = AppleExtractor.extract(&rec);
        assert_eq!(meta.capacity_gb, Some(1024));
        assert_eq!(meta.identification_code.as_deref(), Some("A3102"));
        assert_eq!(meta.normalized_model.as_deref(), Some("iphone 15 pro"));
    }
}
