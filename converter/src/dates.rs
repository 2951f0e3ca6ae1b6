//! Date parsing for transaction dates and command-line bounds.
//!
//! Tries a fixed list of common export layouts. Ambiguous numeric dates such as
//! `01/05/09` are read month-first unless `day_first` is set; a first component
//! above 12 is always a day regardless of the flag.

use chrono::{NaiveDate, NaiveDateTime};

const ISO_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

// Two-digit year layouts come first: `%Y` happily accepts "21" as year 21.
const MONTH_FIRST: &[&str] = &[
    "%m/%d/%y", "%m/%d/%Y", "%m-%d-%y", "%m-%d-%Y", "%m.%d.%y", "%m.%d.%Y",
];

const DAY_FIRST: &[&str] = &[
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%y", "%d-%m-%Y", "%d.%m.%y", "%d.%m.%Y",
];

const TEXTUAL: &[&str] = &[
    "%d %b %Y", "%d-%b-%Y", "%d-%b-%y", "%b %d, %Y", "%b %d %Y", "%d %B %Y", "%B %d, %Y",
    "%B %d %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
];

/// Error returned when no known layout matches.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unrecognized date '{0}'")]
pub struct DateError(pub String);

/// Parse a calendar date from export text.
pub fn parse_date(text: &str, day_first: bool) -> Result<NaiveDate, DateError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DateError(text.to_string()));
    }

    if let Some(date) = try_date_formats(text, day_first) {
        return Ok(date);
    }

    if let Some(dt) = try_datetime(text) {
        return Ok(dt.date());
    }

    // "03/15/2021 10:42" and friends: parse the date part alone
    if let Some((date_part, time_part)) = text.split_once([' ', 'T']) {
        if time_part.contains(':') {
            if let Some(date) = try_date_formats(date_part.trim(), day_first) {
                return Ok(date);
            }
        }
    }

    Err(DateError(text.to_string()))
}

/// Parse a date with an explicit `strftime` layout.
pub fn parse_date_with_format(text: &str, format: &str) -> Result<NaiveDate, DateError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, format)
        .or_else(|_| NaiveDateTime::parse_from_str(text, format).map(|dt| dt.date()))
        .map_err(|_| DateError(text.to_string()))
}

/// Parse a date or timestamp, used for the statement server date.
pub fn parse_datetime(text: &str, day_first: bool) -> Result<NaiveDateTime, DateError> {
    let trimmed = text.trim();
    if let Some(dt) = try_datetime(trimmed) {
        return Ok(dt);
    }
    parse_date(trimmed, day_first)?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DateError(trimmed.to_string()))
}

fn try_date_formats(text: &str, day_first: bool) -> Option<NaiveDate> {
    let (first, second) = if day_first {
        (DAY_FIRST, MONTH_FIRST)
    } else {
        (MONTH_FIRST, DAY_FIRST)
    };

    ISO_FORMATS
        .iter()
        .chain(first)
        .chain(second)
        .chain(TEXTUAL)
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn try_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso() {
        assert_eq!(parse_date("2021-01-01", false).unwrap(), ymd(2021, 1, 1));
        assert_eq!(parse_date("20210315", false).unwrap(), ymd(2021, 3, 15));
    }

    #[test]
    fn test_ambiguous_month_first_by_default() {
        assert_eq!(parse_date("01/05/09", false).unwrap(), ymd(2009, 1, 5));
        assert_eq!(parse_date("01/05/09", true).unwrap(), ymd(2009, 5, 1));
    }

    #[test]
    fn test_unambiguous_day_over_twelve() {
        assert_eq!(parse_date("25/12/2020", false).unwrap(), ymd(2020, 12, 25));
        assert_eq!(parse_date("12/25/2020", true).unwrap(), ymd(2020, 12, 25));
    }

    #[test]
    fn test_four_digit_year() {
        assert_eq!(parse_date("06/12/2010", false).unwrap(), ymd(2010, 6, 12));
    }

    #[test]
    fn test_textual_and_timestamps() {
        assert_eq!(parse_date("5 Jan 2021", false).unwrap(), ymd(2021, 1, 5));
        assert_eq!(parse_date("Jan 5, 2021", false).unwrap(), ymd(2021, 1, 5));
        assert_eq!(parse_date("2021-01-05T10:30:00", false).unwrap(), ymd(2021, 1, 5));
        assert_eq!(parse_date("01/05/2021 10:30", false).unwrap(), ymd(2021, 1, 5));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_date("", false).is_err());
        assert!(parse_date("yesterday", false).is_err());
        assert!(parse_date("13/13/2020", false).is_err());
    }

    #[test]
    fn test_explicit_format() {
        assert_eq!(parse_date_with_format("2021|03|04", "%Y|%m|%d").unwrap(), ymd(2021, 3, 4));
        assert!(parse_date_with_format("2021-03-04", "%d/%m/%Y").is_err());
    }

    #[test]
    fn test_server_datetime() {
        let dt = parse_datetime("2021-02-03 04:05:06", false).unwrap();
        assert_eq!(dt.format("%Y%m%d%H%M%S").to_string(), "20210203040506");
        let midnight = parse_datetime("2021-02-03", false).unwrap();
        assert_eq!(midnight.format("%H%M%S").to_string(), "000000");
    }
}
