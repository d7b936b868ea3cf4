use chrono::NaiveDateTime;
use std::time::Instant;
use tracing::info;

/// Logs how long a CLI stage took when it goes out of scope.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self { label, start: Instant::now() }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// `YYYY-MM-DD`, or "N/A" when unknown.
pub fn fmt_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Empty and missing text both print as "—".
pub fn fmt_text(text: Option<&str>) -> &str {
    match text {
        Some(t) if !t.is_empty() => t,
        _ => "—",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_fmt_date() {
        let d = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap().and_hms_opt(9, 30, 0);
        assert_eq!(fmt_date(d), "2023-01-05");
        assert_eq!(fmt_date(None), "N/A");
    }

    #[test]
    fn test_fmt_text() {
        assert_eq!(fmt_text(Some("Open")), "Open");
        assert_eq!(fmt_text(Some("")), "—");
        assert_eq!(fmt_text(None), "—");
    }
}
