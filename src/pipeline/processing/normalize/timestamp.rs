use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::pipeline::processing::dst::transition::resolve_wall_clock;

/// Formats carrying an explicit UTC offset, tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
];

/// Wall-clock formats without an offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// A timestamp as written in the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    /// Carried an offset, so the instant is known
    Absolute(DateTime<Utc>),
    /// Plain wall-clock time
    Wall(NaiveDateTime),
}

/// Parse a timestamp string in any of the accepted formats
pub fn parse_timestamp(text: &str) -> Option<ParsedTimestamp> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedTimestamp::Absolute(dt.with_timezone(&Utc)));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(ParsedTimestamp::Absolute(dt.with_timezone(&Utc)));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ParsedTimestamp::Wall(naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(ParsedTimestamp::Wall)
}

/// Turn a parsed timestamp into a UTC instant.
///
/// Wall-clock times are read in `tz` when one is given and as UTC otherwise.
/// The wall-clock value is returned alongside the instant only when it went
/// through `tz`.
pub fn resolve(parsed: ParsedTimestamp, tz: Option<&Tz>) -> (DateTime<Utc>, Option<NaiveDateTime>) {
    match (parsed, tz) {
        (ParsedTimestamp::Absolute(instant), _) => (instant, None),
        (ParsedTimestamp::Wall(wall), Some(tz)) => (resolve_wall_clock(tz, wall).instant(), Some(wall)),
        (ParsedTimestamp::Wall(wall), None) => (Utc.from_utc_datetime(&wall), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Chicago;

    #[test]
    fn test_parses_offset_timestamps_as_absolute() {
        let expected = Utc.with_ymd_and_hms(2021, 6, 1, 5, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("2021-06-01T00:00:00-05:00"),
            Some(ParsedTimestamp::Absolute(expected))
        );
        assert_eq!(
            parse_timestamp("2021-06-01 00:00:00-05:00"),
            Some(ParsedTimestamp::Absolute(expected))
        );
        assert_eq!(
            parse_timestamp("2021-06-01T05:00:00Z"),
            Some(ParsedTimestamp::Absolute(expected))
        );
    }

    #[test]
    fn test_parses_naive_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(13, 15, 0)
            .unwrap();
        for text in [
            "2021-06-01 13:15:00",
            "2021-06-01T13:15:00",
            "2021-06-01 13:15",
            "2021/06/01 13:15:00",
            "06/01/2021 13:15",
            " 2021-06-01 13:15:00 ",
        ] {
            assert_eq!(parse_timestamp(text), Some(ParsedTimestamp::Wall(expected)), "{}", text);
        }
        assert_eq!(
            parse_timestamp("2021-06-01"),
            Some(ParsedTimestamp::Wall(
                NaiveDate::from_ymd_opt(2021, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2021-13-01 00:00:00"), None);
    }

    #[test]
    fn test_resolve_wall_clock_in_timezone() {
        let wall = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let (instant, local) = resolve(ParsedTimestamp::Wall(wall), Some(&Chicago));
        assert_eq!(instant, Utc.with_ymd_and_hms(2021, 6, 1, 5, 0, 0).unwrap());
        assert_eq!(local, Some(wall));

        let (instant, local) = resolve(ParsedTimestamp::Wall(wall), None);
        assert_eq!(instant, Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(local, None);
    }
}
