//! Shared field parsers used by every brand extractor
//!
//! **[DME-EXT-020]** Normalization rules fixed by contract:
//! - Capacity: "256GB", "1TB", "2 TB" (case-insensitive, optional space), TB x 1024
//! - Identification code: letter + 4 digits ("A2348")
//! - Year: any 4-digit token in 2000-2099
//! - Chip: known vocabulary, most-specific-first

use once_cell::sync::Lazy;
use regex::Regex;

static CAPACITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s?(TB|GB)\b").expect("capacity regex"));

static IDENT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Z]\d{4})\b").expect("identification code regex"));

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("year regex"));

static SCREEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(\d{1,2}(?:\.\d)?)\s?(?:"|''|-?inch|in\b)"#).expect("screen regex")
});

static COMPUTE_UNITS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})[\s-]?core\s+gpu\b").expect("compute units regex"));

/// Chip vocabulary, ordered most-specific-first so "M2 Pro" wins over "M2"
pub const CHIP_VOCABULARY: &[&str] = &[
    "M4 Ultra", "M4 Max", "M4 Pro", "M4",
    "M3 Ultra", "M3 Max", "M3 Pro", "M3",
    "M2 Ultra", "M2 Max", "M2 Pro", "M2",
    "M1 Ultra", "M1 Max", "M1 Pro", "M1",
    "A18 Pro", "A18", "A17 Pro", "A16 Bionic", "A16", "A15 Bionic", "A15",
    "A14 Bionic", "A14", "A13 Bionic", "A13",
    "Snapdragon 8 Gen 3", "Snapdragon 8 Gen 2", "Snapdragon 8 Gen 1",
    "Exynos 2400", "Exynos 2200",
];

/// Parse a storage capacity to GB from patterns like "256GB" / "1 TB"
pub fn parse_capacity_gb(text: &str) -> Option<u32> {
    let caps = CAPACITY_RE.captures(text)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str();
    if unit.eq_ignore_ascii_case("tb") {
        Some(value * 1024)
    } else {
        Some(value)
    }
}

/// Extract a manufacturer identification code (letter + 4 digits), uppercased
pub fn parse_identification_code(text: &str) -> Option<String> {
    IDENT_CODE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// Extract a release year in the 2000-2099 range
pub fn parse_year(text: &str) -> Option<u16> {
    YEAR_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract a screen size in inches from "13.6\"" / "13.6-inch" / "13.6 in"
pub fn parse_screen_size(text: &str) -> Option<f32> {
    SCREEN_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Match a chip token against the vocabulary, most-specific-first
pub fn parse_chip(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    CHIP_VOCABULARY
        .iter()
        .find(|chip| contains_token(&lower, &chip.to_lowercase()))
        .map(|chip| chip.to_string())
}

/// Extract a GPU-core style compute-unit count ("10-core GPU")
pub fn parse_compute_units(text: &str) -> Option<u8> {
    COMPUTE_UNITS_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalize a model name: lowercase, strip capacity/code tokens, collapse
/// whitespace
pub fn normalize_model_name(raw: &str) -> String {
    let without_capacity = CAPACITY_RE.replace_all(raw, " ");
    let without_code = IDENT_CODE_RE.replace_all(&without_capacity, " ");
    without_code
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// Token-boundary containment so "m2" does not match inside "m20"
fn contains_token(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack.as_bytes()[abs - 1].is_ascii_alphanumeric();
        let end = abs + needle.len();
        let after_ok = end == haystack.len()
            || !haystack.as_bytes()[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capacity_variants() {
        assert_eq!(parse_capacity_gb("256GB"), Some(256));
        assert_eq!(parse_capacity_gb("256 gb"), Some(256));
        assert_eq!(parse_capacity_gb("1TB"), Some(1024));
        assert_eq!(parse_capacity_gb("2 TB"), Some(2048));
        assert_eq!(parse_capacity_gb("iPhone 15 Pro 512GB"), Some(512));
        assert_eq!(parse_capacity_gb("no capacity here"), None);
    }

    #[test]
    fn test_parse_identification_code() {
        assert_eq!(
            parse_identification_code("MacBook Air A2348").as_deref(),
            Some("A2348")
        );
        assert_eq!(parse_identification_code("a3102").as_deref(), Some("A3102"));
        // Letter followed by more than 4 digits is not a code
        assert_eq!(parse_identification_code("A23481"), None);
        assert_eq!(parse_identification_code("plain text"), None);
    }

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year("released 2023"), Some(2023));
        assert_eq!(parse_year("MacBook Pro (2019)"), Some(2019));
        // 1999 and 2100 fall outside 2000-2099
        assert_eq!(parse_year("iMac 1999"), None);
        assert_eq!(parse_year("year 2100"), None);
    }

    #[test]
    fn test_parse_screen_size() {
        assert_eq!(parse_screen_size("13.6\" display"), Some(13.6));
        assert_eq!(parse_screen_size("15-inch"), Some(15.0));
        assert_eq!(parse_screen_size("6.1 inch OLED"), Some(6.1));
        assert_eq!(parse_screen_size("no screen"), None);
    }

    #[test]
    fn test_parse_chip_most_specific_first() {
        assert_eq!(parse_chip("MacBook Pro M2 Pro 2023").as_deref(), Some("M2 Pro"));
        assert_eq!(parse_chip("MacBook Air M2").as_deref(), Some("M2"));
        assert_eq!(parse_chip("iPhone 15 Pro A17 Pro").as_deref(), Some("A17 Pro"));
        // Token boundary: "m20" must not match "M2"
        assert_eq!(parse_chip("model m20 widget"), None);
    }

    #[test]
    fn test_parse_compute_units() {
        assert_eq!(parse_compute_units("M2 8-core GPU"), Some(8));
        assert_eq!(parse_compute_units("10 core GPU"), Some(10));
        assert_eq!(parse_compute_units("8-core CPU"), None);
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(
            normalize_model_name("iPhone 15 Pro 256GB A3102"),
            "iphone 15 pro"
        );
        assert_eq!(
            normalize_model_name("MacBook  Air   1TB"),
            "macbook air"
        );
    }
}
