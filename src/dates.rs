// src/dates.rs

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// ISO calendar date, the persistence and wire format ("2025-12-15").
const ISO: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Human-readable form used in archive entry names ("15-December-2025").
const LONG: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month repr:long]-[year]");

pub fn parse_iso(s: &str) -> Option<Date> {
    Date::parse(s.trim(), ISO).ok()
}

pub fn to_iso(date: Date) -> String {
    date.format(ISO).expect("ISO date formatting")
}

pub fn to_long(date: Date) -> String {
    date.format(LONG).expect("long date formatting")
}

/// Current calendar date (UTC), used as the ingestion-date fallback.
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Serde adapter so `Invoice` dates serialize as plain ISO strings.
pub mod serde_iso {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::to_iso(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_iso(&s).ok_or_else(|| de::Error::custom(format!("invalid date: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_iso_round_trip() {
        let d = date!(2025 - 12 - 15);
        assert_eq!(to_iso(d), "2025-12-15");
        assert_eq!(parse_iso("2025-12-15"), Some(d));
        assert_eq!(parse_iso(" 2025-12-15 "), Some(d));
    }

    #[test]
    fn test_malformed_dates_rejected() {
        assert_eq!(parse_iso("12/15/2025"), None);
        assert_eq!(parse_iso("2025-13-01"), None);
        assert_eq!(parse_iso("soon"), None);
    }

    #[test]
    fn test_long_form_uses_full_month_name() {
        assert_eq!(to_long(date!(2025 - 12 - 15)), "15-December-2025");
        assert_eq!(to_long(date!(2024 - 01 - 03)), "03-January-2024");
    }
}
