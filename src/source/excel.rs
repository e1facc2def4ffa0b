// src/source/excel.rs
use crate::error::SourceError;
use crate::record::{RawValue, SourceBatch};
use crate::source::{build_row, missing_columns, EXCEL_TAG};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::Error(e) => RawValue::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => RawValue::DateTime(ndt),
            None => RawValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => RawValue::Text(s.clone()),
        Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}

/// Reads one worksheet of a local `.xlsx`/`.xls`/`.ods` file.
#[derive(Debug, Clone)]
pub struct ExcelReader {
    path: PathBuf,
    sheet: Option<String>,
    header_row: usize,
    required: Vec<String>,
}

impl ExcelReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            header_row: 0,
            required: Vec::new(),
        }
    }

    /// Worksheet to read; the first one when unset or not present.
    pub fn sheet(mut self, name: Option<String>) -> Self {
        self.sheet = name;
        self
    }

    /// Zero-based row (relative to the used range) holding the column names.
    pub fn header_row(mut self, row: usize) -> Self {
        self.header_row = row;
        self
    }

    pub fn required_columns(mut self, cols: &[&str]) -> Self {
        self.required = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<SourceBatch, SourceError> {
        if !self.path.is_file() {
            return Err(SourceError::unavailable(
                EXCEL_TAG,
                format!("file not found: {}", self.path.display()),
            ));
        }
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| SourceError::malformed(EXCEL_TAG, e))?;

        let names = workbook.sheet_names();
        let sheet_name = self
            .sheet
            .as_ref()
            .filter(|s| names.contains(s))
            .or_else(|| names.first())
            .cloned()
            .ok_or_else(|| SourceError::malformed(EXCEL_TAG, "workbook contains no sheets"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| SourceError::malformed(EXCEL_TAG, e))?;
        let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);

        let mut rows_iter = range.rows().enumerate().skip(self.header_row);
        let headers: Vec<String> = match rows_iter.next() {
            Some((_, cells)) => cells.iter().map(|c| c.to_string().trim().to_string()).collect(),
            None => {
                return Err(SourceError::malformed(
                    EXCEL_TAG,
                    format!("sheet '{}' has no header row {}", sheet_name, self.header_row),
                ))
            }
        };

        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        missing_columns(EXCEL_TAG, &headers, &required);

        let rows: Vec<_> = rows_iter
            .filter_map(|(idx, cells)| {
                // 1-based sheet row number
                let position = first_row + idx + 1;
                build_row(position, &headers, cells.iter().map(cell_to_raw))
            })
            .collect();

        info!(sheet = %sheet_name, rows = rows.len(), "excel loaded");
        Ok(SourceBatch {
            tag: EXCEL_TAG.to_string(),
            rows,
        })
    }
}
