//! Brand-specific disambiguation rules
//!
//! **[DME-HEUR-010]** Last-resort rules for catalog configurations a generic
//! scorer cannot tell apart, e.g. one manufacturer code shared by two
//! hardware variants that differ only in GPU core count or chip tier. Rules
//! are data: a brand, a name for the audit trail, and a discriminator.

use crate::models::{Brand, CatalogCandidate, DeviceMetadata};

/// Field a rule discriminates on when candidates share code and capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminator {
    /// Secondary compute-unit count (GPU cores)
    ComputeUnits,
    /// Chip tier within one generation ("M2" vs "M2 Pro")
    ChipVariant,
}

pub struct HeuristicRule {
    pub brand: Brand,
    pub name: &'static str,
    pub discriminator: Discriminator,
}

impl HeuristicRule {
    /// Apply the rule to a set of candidates sharing code and capacity
    ///
    /// Returns the single candidate the discriminator selects, or `None` when
    /// the record lacks the discriminating field or more than one candidate
    /// survives.
    pub fn apply<'a>(
        &self,
        meta: &DeviceMetadata,
        candidates: &'a [CatalogCandidate],
    ) -> Option<(&'a CatalogCandidate, String)> {
        match self.discriminator {
            Discriminator::ComputeUnits => {
                let units = meta.compute_units?;
                let matches: Vec<_> = candidates
                    .iter()
                    .filter(|c| c.compute_units == Some(units))
                    .collect();
                match matches.as_slice() {
                    [only] => Some((*only, format!("{}: {} compute units", self.name, units))),
                    _ => None,
                }
            }
            Discriminator::ChipVariant => {
                let chip = meta.chip.as_deref()?;
                let matches: Vec<_> = candidates
                    .iter()
                    .filter(|c| {
                        c.chip
                            .as_deref()
                            .map(|cc| cc.eq_ignore_ascii_case(chip))
                            .unwrap_or(false)
                    })
                    .collect();
                match matches.as_slice() {
                    [only] => Some((*only, format!("{}: chip {}", self.name, chip))),
                    _ => None,
                }
            }
        }
    }
}

/// Built-in rule table, ordered most-discriminating first per brand
pub fn default_rules() -> Vec<HeuristicRule> {
    vec![
        HeuristicRule {
            brand: Brand::Apple,
            name: "apple shared-code gpu cores",
            discriminator: Discriminator::ComputeUnits,
        },
        HeuristicRule {
            brand: Brand::Apple,
            name: "apple shared-code chip tier",
            discriminator: Discriminator::ChipVariant,
        },
        HeuristicRule {
            brand: Brand::Samsung,
            name: "samsung shared-code chip",
            discriminator: Discriminator::ChipVariant,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn meta(compute_units: Option<u8>, chip: Option<&str>) -> DeviceMetadata {
        DeviceMetadata {
            brand: Brand::Apple,
            family: Some("macbook air".to_string()),
            raw_model: "MacBook Air M2".to_string(),
            normalized_model: Some("macbook air m2".to_string()),
            capacity_gb: Some(256),
            identification_code: Some("A2681".to_string()),
            screen_size_in: None,
            release_year: None,
            chip: chip.map(|c| c.to_string()),
            compute_units,
            vendor_model_code: None,
            extraction_confidence: 80,
            extraction_issues: Vec::new(),
            extra_fields: HashMap::new(),
        }
    }

    fn variant(description: &str, compute_units: Option<u8>, chip: &str) -> CatalogCandidate {
        CatalogCandidate {
            capacity_id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            description: description.to_string(),
            brand: Brand::Apple,
            family: Some("macbook air".to_string()),
            capacity_gb: 256,
            release_year: Some(2022),
            screen_size_in: Some(13.6),
            chip: Some(chip.to_string()),
            compute_units,
            model_code: None,
            identification_codes: vec!["A2681".to_string()],
        }
    }

    #[test]
    fn test_compute_units_rule_selects_unique_variant() {
        let rule = &default_rules()[0];
        let candidates = vec![
            variant("MacBook Air M2 8-core GPU", Some(8), "M2"),
            variant("MacBook Air M2 10-core GPU", Some(10), "M2"),
        ];

        let (chosen, reason) = rule.apply(&meta(Some(10), Some("M2")), &candidates).unwrap();
        assert_eq!(chosen.compute_units, Some(10));
        assert!(reason.contains("10 compute units"));
    }

    #[test]
    fn test_rule_declines_without_discriminating_field() {
        let rule = &default_rules()[0];
        let candidates = vec![
            variant("MacBook Air M2 8-core GPU", Some(8), "M2"),
            variant("MacBook Air M2 10-core GPU", Some(10), "M2"),
        ];
        assert!(rule.apply(&meta(None, Some("M2")), &candidates).is_none());
    }

    #[test]
    fn test_rule_declines_when_multiple_survive() {
        let rule = &default_rules()[0];
        let candidates = vec![
            variant("MacBook Air M2 10-core GPU", Some(10), "M2"),
            variant("MacBook Air M2 10-core GPU silver", Some(10), "M2"),
        ];
        assert!(rule.apply(&meta(Some(10), Some("M2")), &candidates).is_none());
    }

    #[test]
    fn test_chip_variant_rule() {
        let rule = &default_rules()[1];
        let candidates = vec![
            variant("MacBook Pro 14 M2 Pro", None, "M2 Pro"),
            variant("MacBook Pro 14 M2 Max", None, "M2 Max"),
        ];
        let (chosen, _) = rule.apply(&meta(None, Some("m2 max")), &candidates).unwrap();
        assert_eq!(chosen.chip.as_deref(), Some("M2 Max"));
    }
}
