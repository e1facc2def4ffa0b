// src/source/sheets.rs
use crate::error::SourceError;
use crate::record::{RawValue, SourceBatch};
use crate::source::{build_row, missing_columns, SHEETS_TAG};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use url::Url;

const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d/";
const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Public CSV export URL for a shared spreadsheet, optionally pinned to one tab.
pub fn export_url(sheet_id: &str, sheet_name: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(EXPORT_BASE)?.join(&format!("{}/gviz/tq", sheet_id))?;
    url.query_pairs_mut().append_pair("tqx", "out:csv");
    if let Some(name) = sheet_name {
        url.query_pairs_mut().append_pair("sheet", name);
    }
    Ok(url)
}

/// Parse an exported CSV into rows.
///
/// A bare `ID` header is renamed to `identifier_column` when that column is
/// absent. With a non-empty `keep` list only those columns survive. Every
/// cell stays text; numeric interpretation happens during normalization.
pub fn parse_csv_rows(
    text: &str,
    identifier_column: &str,
    keep: &[String],
    required: &[&str],
) -> Result<SourceBatch, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut headers: Vec<String> = rdr
        .headers()
        .map_err(|e| SourceError::malformed(SHEETS_TAG, e))?
        .iter()
        .map(str::to_string)
        .collect();

    if !headers.iter().any(|h| h == identifier_column) {
        if let Some(h) = headers.iter_mut().find(|h| h.as_str() == "ID") {
            *h = identifier_column.to_string();
        }
    }
    if !keep.is_empty() {
        for h in headers.iter_mut() {
            if !keep.contains(h) {
                h.clear();
            }
        }
    }
    missing_columns(SHEETS_TAG, &headers, required);

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| SourceError::malformed(SHEETS_TAG, e))?;
        // line the record starts on; quoted cells may span several
        let position = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let values = record.iter().map(|cell| {
            if cell.is_empty() {
                RawValue::Empty
            } else {
                RawValue::Text(cell.to_string())
            }
        });
        if let Some(row) = build_row(position, &headers, values) {
            rows.push(row);
        }
    }

    Ok(SourceBatch {
        tag: SHEETS_TAG.to_string(),
        rows,
    })
}

/// Reads a shared spreadsheet through its public CSV export.
#[derive(Debug, Clone)]
pub struct SheetsReader {
    client: Client,
    sheet_id: String,
    sheet_name: Option<String>,
    identifier_column: String,
    keep: Vec<String>,
    required: Vec<String>,
}

impl SheetsReader {
    pub fn new(client: Client, sheet_id: impl Into<String>, identifier_column: impl Into<String>) -> Self {
        Self {
            client,
            sheet_id: sheet_id.into(),
            sheet_name: None,
            identifier_column: identifier_column.into(),
            keep: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn sheet_name(mut self, name: Option<String>) -> Self {
        self.sheet_name = name;
        self
    }

    pub fn keep_columns(mut self, cols: Vec<String>) -> Self {
        self.keep = cols;
        self
    }

    pub fn required_columns(mut self, cols: &[&str]) -> Self {
        self.required = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    #[instrument(level = "info", skip(self), fields(sheet = %self.sheet_id))]
    pub async fn read(&self) -> Result<SourceBatch, SourceError> {
        let url = export_url(&self.sheet_id, self.sheet_name.as_deref())
            .map_err(|e| SourceError::unavailable(SHEETS_TAG, e))?;

        let mut attempt = 0;
        let body = loop {
            attempt += 1;

            // 1) fetch export
            match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    // 2) read body
                    match resp.text().await {
                        Ok(text) => break text,
                        Err(e) if attempt < MAX_RETRIES => {
                            warn!(attempt, error = %e, "reading sheet body failed, retrying");
                            sleep(RETRY_DELAY).await;
                        }
                        Err(e) => return Err(SourceError::unavailable(SHEETS_TAG, e)),
                    }
                }
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    warn!(attempt, status = %resp.status(), "sheet export failed, retrying");
                    sleep(RETRY_DELAY).await;
                }
                Ok(resp) => {
                    return Err(SourceError::unavailable(
                        SHEETS_TAG,
                        format!("HTTP error: {}", resp.status()),
                    ))
                }
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(attempt, error = %e, "sheet request failed, retrying");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(SourceError::unavailable(SHEETS_TAG, e)),
            }
        };

        // 3) parse
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        let batch = parse_csv_rows(&body, &self.identifier_column, &self.keep, &required)?;
        info!(rows = batch.rows.len(), "sheet loaded");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const CSV: &str = "\
ID,descripcion,monto_convenio,monto_pagado,notas
OTRAS-001,Viviendas en Lanús,\"1.234.567,89\",1000,x
,,,,
CONVE-002,Red cloacal,500000,,y
";

    #[test]
    fn renames_id_and_keeps_text() -> Result<()> {
        let batch = parse_csv_rows(CSV, "id_obra", &[], &["id_obra"])?;
        assert_eq!(batch.tag, "sheets");
        assert_eq!(batch.rows.len(), 2);

        let first = &batch.rows[0];
        assert_eq!(first.position, 2);
        assert_eq!(first.get("id_obra"), Some(&RawValue::Text("OTRAS-001".into())));
        assert_eq!(
            first.get("monto_convenio"),
            Some(&RawValue::Text("1.234.567,89".into()))
        );

        let second = &batch.rows[1];
        assert_eq!(second.position, 4);
        assert_eq!(second.get("monto_pagado"), Some(&RawValue::Empty));
        Ok(())
    }

    #[test]
    fn multiline_cells_keep_source_line_numbers() -> Result<()> {
        let csv = "id_obra,descripcion\n\
OTRAS-001,\"Primera línea\nsegunda línea\ntercera línea\"\n\
,sin identificador\n\
OTRAS-003,ok\n";
        let batch = parse_csv_rows(csv, "id_obra", &[], &[])?;
        let positions: Vec<usize> = batch.rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![2, 5, 6]);
        assert_eq!(
            batch.rows[0].get("descripcion"),
            Some(&RawValue::Text("Primera línea\nsegunda línea\ntercera línea".into()))
        );
        Ok(())
    }

    #[test]
    fn existing_identifier_column_wins_over_id() -> Result<()> {
        let csv = "ID,id_obra\n7,OTRAS-7\n";
        let batch = parse_csv_rows(csv, "id_obra", &[], &[])?;
        assert_eq!(batch.rows[0].get("id_obra"), Some(&RawValue::Text("OTRAS-7".into())));
        assert_eq!(batch.rows[0].get("ID"), Some(&RawValue::Text("7".into())));
        Ok(())
    }

    #[test]
    fn keep_list_filters_columns() -> Result<()> {
        let keep = vec!["id_obra".to_string(), "monto_pagado".to_string()];
        let batch = parse_csv_rows(CSV, "id_obra", &keep, &[])?;
        let cols: Vec<&str> = batch.rows[0].cells.keys().map(String::as_str).collect();
        assert_eq!(cols, vec!["id_obra", "monto_pagado"]);
        Ok(())
    }

    #[test]
    fn export_url_encodes_sheet_name() -> Result<()> {
        let url = export_url("abc123", Some("Obras 2024"))?;
        assert_eq!(url.host_str(), Some("docs.google.com"));
        assert_eq!(url.path(), "/spreadsheets/d/abc123/gviz/tq");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("tqx".to_string(), "out:csv".to_string()),
                ("sheet".to_string(), "Obras 2024".to_string()),
            ]
        );
        Ok(())
    }
}
