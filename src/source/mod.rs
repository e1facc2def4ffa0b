// src/source/mod.rs
//
// Readers turn a native source into `RawRow`s. They own file/network access
// and report whole-source failures as `SourceError`; they never validate rows.

pub mod excel;
pub mod sheets;
pub mod uvi;

pub use excel::ExcelReader;
pub use sheets::SheetsReader;

use crate::record::{RawRow, RawValue};
use tracing::warn;

pub const EXCEL_TAG: &str = "excel";
pub const SHEETS_TAG: &str = "sheets";

/// Required columns missing from `headers`. Logged, not fatal: rows without
/// them still normalize with those fields unset.
pub fn missing_columns<'a>(source_tag: &str, headers: &[String], required: &[&'a str]) -> Vec<&'a str> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        warn!(source = source_tag, ?missing, "required columns not found");
    }
    missing
}

/// Build a row from parallel header/value slices, skipping unnamed columns.
/// Returns `None` when every cell is blank (spreadsheet padding).
pub(crate) fn build_row(
    position: usize,
    headers: &[String],
    values: impl IntoIterator<Item = RawValue>,
) -> Option<RawRow> {
    let mut row = RawRow::new(position);
    let mut any_value = false;
    for (header, value) in headers.iter().zip(values) {
        if header.is_empty() {
            continue;
        }
        any_value |= !value.is_blank();
        row.insert(header.clone(), value);
    }
    any_value.then_some(row)
}
