// src/format/number.rs
use crate::record::{Extracted, RawValue};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Spreadsheet float → decimal through its shortest round-trip text, so `0.1`
/// stays `0.1` instead of the binary expansion.
pub fn decimal_from_f64(f: f64) -> Option<Decimal> {
    if !f.is_finite() {
        return None;
    }
    Decimal::from_str(&f.to_string())
        .ok()
        .or_else(|| Decimal::from_f64_retain(f))
}

/// Parse numeric text the way people type it into a sheet: currency symbols,
/// spaces and grouping separators are dropped. When both `.` and `,` appear the
/// last one is the decimal mark. A lone separator repeated is grouping; a lone
/// single separator is decimal when it matches `decimal_sep`, grouping when it
/// is the other mark followed by exactly three digits.
pub fn parse_decimal_text(raw: &str, decimal_sep: char) -> Option<Decimal> {
    let cleaned = clean_str(raw);
    let mut negative = false;
    let mut body: String = cleaned
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != '\u{a0}')
        .collect();

    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }
    for prefix in ["ARS", "USD", "U$S"] {
        if let Some(rest) = body.strip_prefix(prefix) {
            body = rest.to_string();
        }
    }
    if let Some(rest) = body.strip_prefix('-') {
        negative = !negative;
        body = rest.to_string();
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest.to_string();
    }
    if body.is_empty() {
        return None;
    }

    let dots = body.matches('.').count();
    let commas = body.matches(',').count();
    let normalized = match (dots, commas) {
        (0, 0) => body,
        (_, 0) | (0, _) => {
            let mark = if dots > 0 { '.' } else { ',' };
            let count = dots.max(commas);
            if count > 1 {
                body.replace(mark, "")
            } else if mark == decimal_sep {
                body.replace(mark, ".")
            } else {
                let after = body.rsplit(mark).next().map(str::len).unwrap_or(0);
                if after == 3 {
                    body.replace(mark, "")
                } else {
                    body.replace(mark, ".")
                }
            }
        }
        _ => {
            let last_dot = body.rfind('.').unwrap_or(0);
            let last_comma = body.rfind(',').unwrap_or(0);
            if last_comma > last_dot {
                body.replace('.', "").replace(',', ".")
            } else {
                body.replace(',', "")
            }
        }
    };

    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '-')
    {
        return None;
    }
    let value = Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()?;
    Some(if negative { -value } else { value })
}

/// Read any raw cell as a decimal.
pub fn extract_decimal(value: Option<&RawValue>, decimal_sep: char) -> Extracted<Decimal> {
    let value = match value {
        None => return Extracted::Absent,
        Some(v) if v.is_blank() => return Extracted::Absent,
        Some(v) => v,
    };
    match value {
        RawValue::Number(f) => match decimal_from_f64(*f) {
            Some(d) => Extracted::Valid(d),
            None => Extracted::Invalid(f.to_string()),
        },
        RawValue::Text(s) => match parse_decimal_text(s, decimal_sep) {
            Some(d) => Extracted::Valid(d),
            None => Extracted::Invalid(s.clone()),
        },
        other => Extracted::Invalid(other.as_text().unwrap_or_default()),
    }
}

/// Read a progress/percentage cell as a ratio. Text with `%` and plain values
/// above 1 are treated as percentages and divided by 100.
pub fn extract_ratio(value: Option<&RawValue>, decimal_sep: char) -> Extracted<Decimal> {
    let explicit_percent = matches!(value, Some(RawValue::Text(s)) if s.contains('%'));
    let stripped;
    let value = match value {
        Some(RawValue::Text(s)) if explicit_percent => {
            stripped = RawValue::Text(s.replace('%', ""));
            Some(&stripped)
        }
        other => other,
    };
    match extract_decimal(value, decimal_sep) {
        Extracted::Valid(d) if explicit_percent || d > Decimal::ONE => {
            match d.checked_div(Decimal::ONE_HUNDRED) {
                Some(r) => Extracted::Valid(r),
                None => Extracted::Invalid(d.to_string()),
            }
        }
        other => other,
    }
}

/// Insert `sep` every three digits from the right of an ASCII digit string.
pub fn group_digits(digits: &str, sep: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}
