use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Normalize a label to a snake_case key.
/// "Filing Date:" → "filing_date" | "Decision(s)" → "decision_s"
pub fn normalize_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    for c in label.chars() {
        let c = if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' };
        if c == '_' && key.ends_with('_') {
            continue;
        }
        key.push(c);
    }
    key.trim_matches('_').to_string()
}

// ── Detail field routing ──────────────────────────────────────────────────────

pub const PROPERTY_KEYS: &[&str] = &[
    "property_roll_number",
    "appeal_number",
    "location_property_description",
    "municipality",
    "property_classification",
    "nbhd",
];

pub const APPELLANT_KEYS: &[&str] = &[
    "name1",
    "name_of_representative",
    "filing_date",
    "tax_date",
    "section",
    "reason_for_appeal",
    "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Property,
    Appellant,
}

/// Route a normalized key; unknown keys belong to the property section.
pub fn classify_key(key: &str) -> Section {
    if PROPERTY_KEYS.contains(&key) {
        Section::Property
    } else if APPELLANT_KEYS.contains(&key) {
        Section::Appellant
    } else {
        Section::Property
    }
}

// ── Dates ─────────────────────────────────────────────────────────────────────

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
];

/// Lenient parse of free-text dates as they appear on the tribunal site.
/// Empty input is `None` silently; unrecognised input is `None` with a warning.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // "Sept" shows up on some decision pages; chrono only knows "Sep".
    let s = s.replace("Sept.", "Sep").replace("Sept ", "Sep ");
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    warn!("Failed to parse date: {:?}", s);
    None
}

/// `Some(s)` only when `s` has non-whitespace content.
pub fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Filing Date"), "filing_date");
        assert_eq!(normalize_key("  Property Roll Number: "), "property_roll_number");
        assert_eq!(normalize_key("Decision(s)"), "decision_s");
        assert_eq!(normalize_key("Decision Details"), "decision_details");
        assert_eq!(normalize_key("NBHD"), "nbhd");
        assert_eq!(normalize_key("Name1"), "name1");
        assert_eq!(normalize_key("--"), "");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn test_normalize_key_is_idempotent() {
        let labels = [
            "Filing Date:",
            "__Reason  for   Appeal__",
            "Location/Property Description",
            "Café № 7",
            "a__b--c",
            "???",
            "Hearing No.",
        ];
        for label in labels {
            let once = normalize_key(label);
            assert_eq!(normalize_key(&once), once, "label {label:?}");
            assert!(!once.contains("__"));
            assert!(!once.starts_with('_') && !once.ends_with('_'));
        }
    }

    #[test]
    fn test_classify_key() {
        assert_eq!(classify_key("filing_date"), Section::Appellant);
        assert_eq!(classify_key("name_of_representative"), Section::Appellant);
        assert_eq!(classify_key("municipality"), Section::Property);
        assert_eq!(classify_key("decision_mailing_date"), Section::Property);
    }

    #[test]
    fn test_parse_date() {
        let jan5 = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap().and_hms_opt(0, 0, 0);
        assert_eq!(parse_date("2023-01-05"), jan5);
        assert_eq!(parse_date("01/05/2023"), jan5);
        assert_eq!(parse_date("Jan 5, 2023"), jan5);
        assert_eq!(parse_date("January 05, 2023"), jan5);
        assert_eq!(parse_date("5 Jan 2023"), jan5);
        assert_eq!(
            parse_date("1/5/2023 2:30:00 PM"),
            NaiveDate::from_ymd_opt(2023, 1, 5).unwrap().and_hms_opt(14, 30, 0)
        );
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not a date"), None);
    }
}
