// src/format/date.rs
use crate::format::number::clean_str;
use crate::record::{Extracted, RawValue};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Spreadsheet serial day 0 for serials past the phantom 1900-02-29.
fn serial_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Spreadsheet day serial → date. Only the range the 1900 system can express.
///
/// Serial 60 is the nonexistent 1900-02-29 and yields `None`; serials below it
/// are shifted one day so that serial 1 is 1900-01-01.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let days = match serial.trunc() as i64 {
        60 => return None,
        d if d < 60 => d + 1,
        d => d,
    };
    serial_epoch()?.checked_add_signed(Duration::days(days))
}

/// Parse ISO (`2024-03-05`, `2024-03-05T10:00:00`, RFC 3339) and locale
/// (`05/03/2024`, `5-3-24`, `05.03.2024`) date text.
pub fn parse_date_str(raw: &str, day_first: bool) -> Option<NaiveDate> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt.date());
        }
    }

    // drop any trailing time component, e.g. "05/03/2024 00:00:00"
    let date_part = s.split_whitespace().next()?;
    let parts: Vec<&str> = date_part.split(['/', '-', '.']).collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;
    let (year, month, day) = if parts[0].len() == 4 {
        (nums[0] as i32, nums[1], nums[2])
    } else {
        let year = match parts[2].len() {
            2 => 2000 + nums[2] as i32,
            4 => nums[2] as i32,
            _ => return None,
        };
        if day_first {
            (year, nums[1], nums[0])
        } else {
            (year, nums[0], nums[1])
        }
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn extract_date(value: Option<&RawValue>, day_first: bool) -> Extracted<NaiveDate> {
    let value = match value {
        None => return Extracted::Absent,
        Some(v) if v.is_blank() => return Extracted::Absent,
        Some(v) => v,
    };
    let parsed = match value {
        RawValue::Date(d) => Some(*d),
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Number(f) => date_from_serial(*f),
        RawValue::Text(s) => parse_date_str(s, day_first),
        RawValue::Bool(_) | RawValue::Empty => None,
    };
    match parsed {
        Some(d) => Extracted::Valid(d),
        None => Extracted::Invalid(value.as_text().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn iso_variants() {
        assert_eq!(parse_date_str("2024-03-05", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("2024-03-05T10:11:12", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("2024-03-05 10:11:12.500", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("2024-03-05T10:11:12-03:00", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("2024/03/05", false), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn locale_order_follows_config() {
        assert_eq!(parse_date_str("05/03/2024", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("05/03/2024", false), Some(ymd(2024, 5, 3)));
        assert_eq!(parse_date_str("5-3-24", true), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date_str("05.03.2024 00:00:00", true), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn rejects_nonsense() {
        assert_eq!(parse_date_str("31/02/2024", true), None);
        assert_eq!(parse_date_str("pendiente", true), None);
        assert_eq!(parse_date_str("1/2", true), None);
        assert_eq!(parse_date_str("", true), None);
    }

    #[test]
    fn serials() {
        assert_eq!(date_from_serial(45356.0), Some(ymd(2024, 3, 5)));
        assert_eq!(date_from_serial(45356.75), Some(ymd(2024, 3, 5)));
        assert_eq!(date_from_serial(0.0), None);
        assert_eq!(date_from_serial(-3.0), None);
    }

    #[test]
    fn serials_around_phantom_leap_day() {
        assert_eq!(date_from_serial(1.0), Some(ymd(1900, 1, 1)));
        assert_eq!(date_from_serial(59.0), Some(ymd(1900, 2, 28)));
        assert_eq!(date_from_serial(60.0), None);
        assert_eq!(date_from_serial(61.0), Some(ymd(1900, 3, 1)));
    }

    #[test]
    fn extract_tri_state() {
        assert_eq!(extract_date(None, true), Extracted::Absent);
        assert_eq!(extract_date(Some(&RawValue::from(" ")), true), Extracted::Absent);
        assert_eq!(
            extract_date(Some(&RawValue::from("ayer")), true),
            Extracted::Invalid("ayer".into())
        );
        let dt = ymd(2023, 12, 1).and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(
            extract_date(Some(&RawValue::DateTime(dt)), true),
            Extracted::Valid(ymd(2023, 12, 1))
        );
    }
}
