//! Vendor record metadata and signatures
//!
//! **[DME-META-010]** Normalized device facts extracted from one vendor record
//! **[DME-SIG-010]** Deterministic signature over the matching-relevant fields

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// One raw vendor record: a loosely-typed field bag plus optional hints
///
/// The engine does not own feed ingestion; callers hand over pre-parsed
/// records (one JSON object per feed row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Vendor's own row key / model code for this record
    pub vendor_key: String,

    /// Brand hint from the feed, if the vendor provides one
    #[serde(default)]
    pub brand_hint: Option<String>,

    /// All feed fields, keyed by vendor column name
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl RawRecord {
    /// Fetch a field as a string, accepting string or numeric JSON values
    pub fn field_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Device brand, classified by a pure decision tree over record fields
///
/// Closed set: extractor selection is a match on this enum, not runtime
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Apple,
    Samsung,
    Unknown,
}

impl Brand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Apple => "apple",
            Brand::Samsung => "samsung",
            Brand::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// **[DME-META-010]** Normalized facts extracted from one vendor record
///
/// Immutable once extracted; derived solely from the raw record. Missing or
/// unparseable fields stay `None` and are noted in `extraction_issues`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Classified brand
    pub brand: Brand,

    /// Device family / type ("iphone", "macbook pro", ...), lowercase
    pub family: Option<String>,

    /// Model name exactly as the vendor sent it
    pub raw_model: String,

    /// Normalized model name (lowercase, capacity/code tokens stripped)
    pub normalized_model: Option<String>,

    /// Storage capacity in GB (TB converted at 1 TB = 1024 GB)
    pub capacity_gb: Option<u32>,

    /// Manufacturer identification code (letter + 4 digits, e.g. "A2348")
    pub identification_code: Option<String>,

    /// Screen size in inches
    pub screen_size_in: Option<f32>,

    /// Release year (2000-2099)
    pub release_year: Option<u16>,

    /// CPU / chip identifier from the known vocabulary ("M2 Pro", "A17 Pro")
    pub chip: Option<String>,

    /// Secondary compute-unit count (e.g. GPU cores), when stated
    pub compute_units: Option<u8>,

    /// Vendor-specific model code (the feed's own key)
    pub vendor_model_code: Option<String>,

    /// Extraction confidence 0-100: weighted share of populated fields
    pub extraction_confidence: u8,

    /// Non-fatal notes about fields that failed to parse
    pub extraction_issues: Vec<String>,

    /// Untyped source fields kept for traceability; matching logic never
    /// reads business data out of this bag
    pub extra_fields: HashMap<String, serde_json::Value>,
}

impl DeviceMetadata {
    /// **[DME-SIG-010]** Compute the deterministic signature for this record
    ///
    /// Hashes the subset of fields that identify a distinct sellable
    /// configuration: brand, normalized model, capacity, identification code.
    /// Pure function: no time, no randomness.
    pub fn signature(&self) -> DeviceSignature {
        let model = self
            .normalized_model
            .as_deref()
            .unwrap_or(&self.raw_model)
            .to_lowercase();
        let capacity = self
            .capacity_gb
            .map(|c| c.to_string())
            .unwrap_or_default();
        let code = self
            .identification_code
            .as_deref()
            .unwrap_or("")
            .to_lowercase();

        let canonical = format!("{}|{}|{}|{}", self.brand, model.trim(), capacity, code);
        let digest = Sha256::digest(canonical.as_bytes());
        DeviceSignature(format!("{:x}", digest))
    }
}

/// **[DME-SIG-010]** Stable identity of one sellable device configuration
///
/// Cache and dedup key. Two records with identical relevant fields always
/// produce identical signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSignature(pub String);

impl DeviceSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_metadata() -> DeviceMetadata {
        DeviceMetadata {
            brand: Brand::Apple,
            family: Some("iphone".to_string()),
            raw_model: "iPhone 15 Pro".to_string(),
            normalized_model: Some("iphone 15 pro".to_string()),
            capacity_gb: Some(256),
            identification_code: Some("A3102".to_string()),
            screen_size_in: None,
            release_year: Some(2023),
            chip: None,
            compute_units: None,
            vendor_model_code: Some("VX-1001".to_string()),
            extraction_confidence: 90,
            extraction_issues: Vec::new(),
            extra_fields: HashMap::new(),
        }
    }

    #[test]
    fn test_signature_deterministic() {
        let a = base_metadata();
        let b = base_metadata();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_ignores_non_identity_fields() {
        let a = base_metadata();
        let mut b = base_metadata();
        b.release_year = Some(2024);
        b.extraction_confidence = 10;
        b.vendor_model_code = Some("VX-9999".to_string());
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_changes_with_capacity() {
        let a = base_metadata();
        let mut b = base_metadata();
        b.capacity_gb = Some(512);
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_case_insensitive_code() {
        let a = base_metadata();
        let mut b = base_metadata();
        b.identification_code = Some("a3102".to_string());
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_field_str_accepts_numbers() {
        let mut fields = HashMap::new();
        fields.insert("year".to_string(), serde_json::json!(2023));
        fields.insert("model".to_string(), serde_json::json!("iPhone 15"));
        fields.insert("tags".to_string(), serde_json::json!(["a", "b"]));
        let record = RawRecord {
            vendor_key: "VX-1001".to_string(),
            brand_hint: None,
            fields,
        };
        assert_eq!(record.field_str("year").as_deref(), Some("2023"));
        assert_eq!(record.field_str("model").as_deref(), Some("iPhone 15"));
        assert_eq!(record.field_str("tags"), None);
    }
}
