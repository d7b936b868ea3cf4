//! Per-field update rules applied when an entity already exists.

use crate::scraper::cleaner::parse_date;
use chrono::NaiveDateTime;

/// A value arriving from a scraped payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming<T> {
    /// The payload has no such key.
    Absent,
    /// The key is there. `blank` is true when its raw text was empty.
    Present { value: Option<T>, blank: bool },
}

impl<T> Incoming<T> {
    /// What a freshly created row stores.
    pub fn into_value(self) -> Option<T> {
        match self {
            Incoming::Absent => None,
            Incoming::Present { value, .. } => value,
        }
    }
}

impl Incoming<String> {
    pub fn text(raw: Option<&str>) -> Self {
        match raw {
            None => Incoming::Absent,
            Some(s) => Incoming::Present { value: Some(s.to_string()), blank: s.is_empty() },
        }
    }
}

impl Incoming<NaiveDateTime> {
    /// Blankness follows the raw text: an unparseable non-empty date still counts.
    pub fn date(raw: Option<&str>) -> Self {
        match raw {
            None => Incoming::Absent,
            Some(s) => Incoming::Present { value: parse_date(s), blank: s.is_empty() },
        }
    }

    /// Blankness follows the parsed value.
    pub fn parsed(value: Option<NaiveDateTime>) -> Self {
        Incoming::Present { blank: value.is_none(), value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Take whatever comes in; a missing key clears the field.
    AlwaysOverwrite,
    /// Take whatever comes in, blanks included; a missing key keeps the field.
    OverwriteIfPresent,
    /// Only non-empty input replaces the stored value.
    OverwriteIfNonEmpty,
    /// Set on create, never touched again.
    ImmutableAfterCreate,
}

impl MergePolicy {
    pub fn merge<T>(self, current: Option<T>, incoming: Incoming<T>) -> Option<T> {
        match (self, incoming) {
            (MergePolicy::ImmutableAfterCreate, _) => current,
            (MergePolicy::AlwaysOverwrite, incoming) => incoming.into_value(),
            (MergePolicy::OverwriteIfPresent, Incoming::Absent) => current,
            (MergePolicy::OverwriteIfPresent, Incoming::Present { value, .. }) => value,
            (MergePolicy::OverwriteIfNonEmpty, Incoming::Present { value, blank: false }) => value,
            (MergePolicy::OverwriteIfNonEmpty, _) => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn always_overwrite_clears_on_blank_and_absent() {
        let p = MergePolicy::AlwaysOverwrite;
        assert_eq!(p.merge(s("old"), Incoming::text(Some("new"))), s("new"));
        assert_eq!(p.merge(s("old"), Incoming::text(Some(""))), s(""));
        assert_eq!(p.merge(s("old"), Incoming::text(None)), None);
    }

    #[test]
    fn overwrite_if_present_keeps_on_absent_only() {
        let p = MergePolicy::OverwriteIfPresent;
        assert_eq!(p.merge(s("old"), Incoming::text(Some(""))), s(""));
        assert_eq!(p.merge(s("old"), Incoming::text(None)), s("old"));
    }

    #[test]
    fn overwrite_if_non_empty_ignores_blanks() {
        let p = MergePolicy::OverwriteIfNonEmpty;
        assert_eq!(p.merge(s("old"), Incoming::text(Some(""))), s("old"));
        assert_eq!(p.merge(s("old"), Incoming::text(None)), s("old"));
        assert_eq!(p.merge(s("old"), Incoming::text(Some("new"))), s("new"));
    }

    #[test]
    fn immutable_keeps_current() {
        let p = MergePolicy::ImmutableAfterCreate;
        assert_eq!(p.merge(s("first"), Incoming::text(Some("second"))), s("first"));
        assert_eq!(p.merge(None, Incoming::text(Some("second"))), None);
    }

    #[test]
    fn unparseable_date_text_is_not_blank() {
        let old = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0);
        let p = MergePolicy::OverwriteIfNonEmpty;
        assert_eq!(p.merge(old, Incoming::date(Some(""))), old);
        assert_eq!(p.merge(old, Incoming::date(Some("garbage"))), None);
        assert_eq!(p.merge(old, Incoming::parsed(None)), old);
    }
}
