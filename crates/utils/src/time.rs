use chrono::{DateTime, Utc};

/// Format a timestamp as an RFC 5322 date, the form used in synthesized
/// `Received:` trace headers (spec.md §4.5).
pub fn rfc5322(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_rfc5322() {
        let t = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
        assert_eq!(rfc5322(t), "Sun, 26 Jul 2026 12:00:00 +0000");
    }
}
