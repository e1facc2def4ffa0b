// src/record/mod.rs
//
// Row and record shapes shared by readers, the engine and the renderer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single cell as handed over by a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl RawValue {
    /// Empty cells, whitespace-only text and the `--` filler count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => {
                let t = s.trim();
                t.is_empty() || t == "--" || t.eq_ignore_ascii_case("nan")
            }
            RawValue::Number(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Display text for string-typed fields. Whole numbers print without `.0`.
    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match self {
            RawValue::Text(s) => Some(s.trim().to_string()),
            RawValue::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", *f as i64))
            }
            RawValue::Number(f) => Some(f.to_string()),
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Date(d) => Some(d.to_string()),
            RawValue::DateTime(dt) => Some(dt.to_string()),
            RawValue::Empty => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Number(f)
    }
}

/// One row out of a reader: column name → cell, plus the row's 1-based
/// position in its source (header rows included) for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub position: usize,
    pub cells: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<RawValue>) -> Self {
        self.cells.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: RawValue) {
        self.cells.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.cells.get(column)
    }
}

/// The rows one reader produced, tagged with where they came from.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub tag: String,
    pub rows: Vec<RawRow>,
}

/// Outcome of pulling one typed field out of a raw row.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Valid(T),
    /// The column was there but could not be read as `T`; carries the raw text.
    Invalid(String),
    Absent,
}

impl<T> Extracted<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Extracted::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Extracted::Valid(_))
    }
}

/// A present-but-unusable field. The field is left unset on the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub column: String,
    pub raw: String,
    pub reason: String,
}

/// Data-quality flags raised while computing a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFlags {
    /// Contract or paid amount was blank/non-numeric and counted as zero.
    pub incomplete_financials: bool,
    pub negative_input_detected: bool,
    /// Paid amount exceeded the contract; remaining was floored at zero.
    pub negative_remainder: bool,
    /// Contract minus paid overflowed; remaining shows zero.
    pub remaining_overflow: bool,
    /// A ratio above 100% was capped before display.
    pub percent_capped: bool,
    pub indexed_amount_available: bool,
}

/// Display strings for every numeric and date field. The renderer uses these
/// and never formats on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedFields {
    pub contract_amount: String,
    pub paid_amount: String,
    pub remaining_amount: String,
    pub accrued_amount: String,
    pub updated_amount: String,
    pub remaining_updated_amount: String,
    pub index_unit_value: String,
    pub indexed_amount: String,
    pub updated_balance: String,
    pub percent_complete: String,
    pub physical_progress: String,
    pub physical_progress_remaining: String,
    pub financial_progress: String,
    pub uvi_quantity: String,
    pub uvi_remaining: String,
    pub houses_total: String,
    pub houses_delivered: String,
    pub houses_remaining: String,
    pub venture_codes: String,
    pub work_codes: String,
    pub uvi_quote_date: String,
    pub last_update_date: String,
}

/// Fully normalized project row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub identifier: String,
    pub historic_id: String,
    pub description: String,
    pub short_description: String,
    pub status: String,
    pub location: String,
    pub municipality: String,
    pub modality: String,
    pub financing_requester: String,
    pub budget_requester: String,
    pub gdeba_file: String,

    pub contract_amount: Option<Decimal>,
    pub paid_amount: Option<Decimal>,
    pub remaining_amount: Decimal,
    pub accrued_amount: Option<Decimal>,
    pub updated_amount: Option<Decimal>,
    pub remaining_updated_amount: Option<Decimal>,
    pub index_unit_value: Option<Decimal>,
    pub indexed_amount: Option<Decimal>,
    pub updated_balance: Option<Decimal>,
    pub percent_complete: Option<Decimal>,
    pub physical_progress: Option<Decimal>,
    pub physical_progress_remaining: Option<Decimal>,
    pub financial_progress: Option<Decimal>,
    pub uvi_quantity: Option<Decimal>,
    pub uvi_remaining: Option<Decimal>,
    pub houses_total: Option<Decimal>,
    pub houses_delivered: Option<Decimal>,
    pub houses_remaining: Option<Decimal>,
    pub venture_codes: Option<Decimal>,
    pub work_codes: Option<Decimal>,
    pub uvi_quote_date: Option<NaiveDate>,
    pub last_update_date: Option<NaiveDate>,

    pub flags: RecordFlags,
    pub warnings: Vec<FieldWarning>,
    pub formatted: FormattedFields,

    pub source_tag: String,
    pub position: usize,
    /// Advisory only; ignored by `PartialEq`.
    pub processed_at: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn indexed_amount_available(&self) -> bool {
        self.flags.indexed_amount_available
    }

    /// Names of the optional numeric/date fields that ended up unset.
    pub fn unset_fields(&self) -> Vec<&'static str> {
        let numeric = [
            ("contract_amount", self.contract_amount.is_none()),
            ("paid_amount", self.paid_amount.is_none()),
            ("accrued_amount", self.accrued_amount.is_none()),
            ("updated_amount", self.updated_amount.is_none()),
            ("index_unit_value", self.index_unit_value.is_none()),
            ("indexed_amount", self.indexed_amount.is_none()),
            ("updated_balance", self.updated_balance.is_none()),
            ("percent_complete", self.percent_complete.is_none()),
            ("physical_progress", self.physical_progress.is_none()),
            ("financial_progress", self.financial_progress.is_none()),
            ("uvi_quantity", self.uvi_quantity.is_none()),
            ("houses_total", self.houses_total.is_none()),
            ("houses_delivered", self.houses_delivered.is_none()),
            ("uvi_quote_date", self.uvi_quote_date.is_none()),
            ("last_update_date", self.last_update_date.is_none()),
        ];
        numeric
            .into_iter()
            .filter_map(|(name, unset)| unset.then_some(name))
            .collect()
    }
}

impl PartialEq for CanonicalRecord {
    fn eq(&self, other: &Self) -> bool {
        // Exhaustive: a new field won't compile until it is compared here.
        let CanonicalRecord {
            identifier,
            historic_id,
            description,
            short_description,
            status,
            location,
            municipality,
            modality,
            financing_requester,
            budget_requester,
            gdeba_file,
            contract_amount,
            paid_amount,
            remaining_amount,
            accrued_amount,
            updated_amount,
            remaining_updated_amount,
            index_unit_value,
            indexed_amount,
            updated_balance,
            percent_complete,
            physical_progress,
            physical_progress_remaining,
            financial_progress,
            uvi_quantity,
            uvi_remaining,
            houses_total,
            houses_delivered,
            houses_remaining,
            venture_codes,
            work_codes,
            uvi_quote_date,
            last_update_date,
            flags,
            warnings,
            formatted,
            source_tag,
            position,
            processed_at: _,
        } = self;

        *identifier == other.identifier
            && *historic_id == other.historic_id
            && *description == other.description
            && *short_description == other.short_description
            && *status == other.status
            && *location == other.location
            && *municipality == other.municipality
            && *modality == other.modality
            && *financing_requester == other.financing_requester
            && *budget_requester == other.budget_requester
            && *gdeba_file == other.gdeba_file
            && *contract_amount == other.contract_amount
            && *paid_amount == other.paid_amount
            && *remaining_amount == other.remaining_amount
            && *accrued_amount == other.accrued_amount
            && *updated_amount == other.updated_amount
            && *remaining_updated_amount == other.remaining_updated_amount
            && *index_unit_value == other.index_unit_value
            && *indexed_amount == other.indexed_amount
            && *updated_balance == other.updated_balance
            && *percent_complete == other.percent_complete
            && *physical_progress == other.physical_progress
            && *physical_progress_remaining == other.physical_progress_remaining
            && *financial_progress == other.financial_progress
            && *uvi_quantity == other.uvi_quantity
            && *uvi_remaining == other.uvi_remaining
            && *houses_total == other.houses_total
            && *houses_delivered == other.houses_delivered
            && *houses_remaining == other.houses_remaining
            && *venture_codes == other.venture_codes
            && *work_codes == other.work_codes
            && *uvi_quote_date == other.uvi_quote_date
            && *last_update_date == other.last_update_date
            && *flags == other.flags
            && *warnings == other.warnings
            && *formatted == other.formatted
            && *source_tag == other.source_tag
            && *position == other.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(RawValue::Empty.is_blank());
        assert!(RawValue::from("   ").is_blank());
        assert!(RawValue::from("--").is_blank());
        assert!(RawValue::Number(f64::NAN).is_blank());
        assert!(!RawValue::from("0").is_blank());
        assert!(!RawValue::Number(0.0).is_blank());
    }

    #[test]
    fn whole_numbers_render_as_integers() {
        assert_eq!(RawValue::Number(12.0).as_text().as_deref(), Some("12"));
        assert_eq!(RawValue::Number(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(RawValue::from("  San Martín ").as_text().as_deref(), Some("San Martín"));
        assert_eq!(RawValue::Empty.as_text(), None);
    }
}
