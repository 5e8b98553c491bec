use bson::DateTime;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses the timestamp shapes the pipeline and its `{___date: …}`
/// envelopes produce: RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD`, and
/// `YYYY-MM`. Partial forms are read in UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime> {
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(DateTime::from_chrono(t.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(DateTime::from_chrono(Utc.from_utc_datetime(&t)));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .ok()?;
    Some(DateTime::from_chrono(
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?),
    ))
}
