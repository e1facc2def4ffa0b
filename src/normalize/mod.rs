// src/normalize/mod.rs
//
// Raw row → `CanonicalRecord`. Field policy:
//   present + valid   → value
//   present + invalid → unset, `FieldWarning` recorded
//   absent            → unset, silently

use crate::calc::{self, FinancialInputs};
use crate::config::EngineConfig;
use crate::error::ValidationError;
use crate::format::{self, date, number};
use crate::record::{
    CanonicalRecord, Extracted, FieldWarning, FormattedFields, RawRow, RecordFlags,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

const SHORT_DESCRIPTION_MAX: usize = 120;

/// First sentence of a description, cut at a word boundary when too long.
pub fn short_description(description: &str) -> String {
    let text = description.trim();
    let sentence = match text.find(". ") {
        Some(idx) => &text[..idx],
        None => text.trim_end_matches('.'),
    };
    if sentence.chars().count() <= SHORT_DESCRIPTION_MAX {
        return sentence.to_string();
    }
    let cut: String = sentence.chars().take(SHORT_DESCRIPTION_MAX).collect();
    let cut = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end_matches([',', ';', ':']))
}

/// Collects field warnings while pulling typed values out of one row.
struct FieldReader<'r> {
    raw: &'r RawRow,
    cfg: &'r EngineConfig,
    warnings: Vec<FieldWarning>,
}

impl<'r> FieldReader<'r> {
    fn text(&self, column: &str) -> String {
        self.raw
            .get(column)
            .and_then(|v| v.as_text())
            .unwrap_or_default()
    }

    fn record<T>(
        &mut self,
        field: &str,
        column: &str,
        kind: &str,
        value: Extracted<T>,
    ) -> Option<T> {
        match value {
            Extracted::Valid(v) => Some(v),
            Extracted::Absent => None,
            Extracted::Invalid(raw) => {
                self.warnings.push(FieldWarning {
                    field: field.to_string(),
                    column: column.to_string(),
                    raw,
                    reason: format!("not a valid {}", kind),
                });
                None
            }
        }
    }

    fn decimal(&mut self, field: &str, column: &str) -> Option<Decimal> {
        let value = number::extract_decimal(
            self.raw.get(column),
            self.cfg.calc.text_decimal_separator,
        );
        self.record(field, column, "number", value)
    }

    fn ratio(&mut self, field: &str, column: &str) -> Option<Decimal> {
        let value = number::extract_ratio(
            self.raw.get(column),
            self.cfg.calc.text_decimal_separator,
        );
        self.record(field, column, "percentage", value)
    }

    fn date(&mut self, field: &str, column: &str) -> Option<NaiveDate> {
        let value = date::extract_date(self.raw.get(column), self.cfg.format.day_first);
        self.record(field, column, "date", value)
    }
}

/// Stateless apart from its configuration; safe to share across threads.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    cfg: &'a EngineConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(cfg: &'a EngineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &EngineConfig {
        self.cfg
    }

    pub fn normalize(
        &self,
        raw: &RawRow,
        source_tag: &str,
    ) -> Result<CanonicalRecord, ValidationError> {
        let cols = &self.cfg.columns;
        let fmt = &self.cfg.format;

        let identifier = raw
            .get(&cols.identifier)
            .and_then(|v| v.as_text())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::MissingIdentifier {
                source_tag: source_tag.to_string(),
                position: raw.position,
            })?;

        let mut fields = FieldReader {
            raw,
            cfg: self.cfg,
            warnings: Vec::new(),
        };

        let contract_amount = fields.decimal("contract_amount", &cols.contract_amount);
        let paid_amount = fields.decimal("paid_amount", &cols.paid_amount);
        let accrued_amount = fields.decimal("accrued_amount", &cols.accrued_amount);
        let updated_amount = fields.decimal("updated_amount", &cols.updated_amount);
        let base_index = fields.decimal("base_index", &cols.base_index);
        let current_index = fields
            .decimal("index_unit_value", &cols.current_index)
            .or(self.cfg.current_index);
        let uvi_quantity = fields.decimal("uvi_quantity", &cols.uvi_quantity);
        let uvi_paid = fields.decimal("uvi_paid", &cols.uvi_paid);
        let houses_total = fields.decimal("houses_total", &cols.houses_total);
        let houses_delivered = fields.decimal("houses_delivered", &cols.houses_delivered);
        let venture_codes = fields.decimal("venture_codes", &cols.venture_codes);
        let work_codes = fields.decimal("work_codes", &cols.work_codes);
        let physical_progress = fields.ratio("physical_progress", &cols.physical_progress);
        let financial_progress = fields.ratio("financial_progress", &cols.financial_progress);
        let uvi_quote_date = fields.date("uvi_quote_date", &cols.uvi_quote_date);
        let last_update_date = fields.date("last_update_date", &cols.last_update_date);

        let derived = calc::compute(
            &FinancialInputs {
                contract_amount,
                paid_amount,
                base_index,
                current_index,
                updated_amount,
                uvi_quantity,
                uvi_paid,
                houses_total,
                houses_delivered,
                physical_progress,
            },
            &self.cfg.calc,
        );

        let (physical_text, physical_capped) =
            format::format_percent_flagged(physical_progress, fmt);
        let (financial_text, financial_capped) =
            format::format_percent_flagged(financial_progress, fmt);

        let formatted = FormattedFields {
            contract_amount: format::format_currency(contract_amount, fmt),
            paid_amount: format::format_currency(paid_amount, fmt),
            remaining_amount: format::format_currency(Some(derived.remaining_amount), fmt),
            accrued_amount: format::format_currency(accrued_amount, fmt),
            updated_amount: format::format_currency(updated_amount, fmt),
            remaining_updated_amount: format::format_currency(
                derived.remaining_updated_amount,
                fmt,
            ),
            index_unit_value: format::format_currency(current_index, fmt),
            indexed_amount: format::format_currency(derived.indexed_amount, fmt),
            updated_balance: format::format_currency(derived.updated_balance, fmt),
            percent_complete: format::format_percent(derived.percent_complete, fmt),
            physical_progress: physical_text,
            physical_progress_remaining: format::format_percent(
                derived.physical_progress_remaining,
                fmt,
            ),
            financial_progress: financial_text,
            uvi_quantity: format::format_number(uvi_quantity, fmt),
            uvi_remaining: format::format_number(derived.uvi_remaining, fmt),
            houses_total: format::format_number(houses_total, fmt),
            houses_delivered: format::format_number(houses_delivered, fmt),
            houses_remaining: format::format_number(derived.houses_remaining, fmt),
            venture_codes: format::format_integer(venture_codes, fmt),
            work_codes: format::format_integer(work_codes, fmt),
            uvi_quote_date: format::format_naive_date(uvi_quote_date, fmt),
            last_update_date: format::format_naive_date(last_update_date, fmt),
        };

        let flags = RecordFlags {
            incomplete_financials: derived.incomplete_financials,
            negative_input_detected: derived.negative_input_detected,
            negative_remainder: derived.negative_remainder,
            remaining_overflow: derived.remaining_overflow,
            percent_capped: derived.percent_capped || physical_capped || financial_capped,
            indexed_amount_available: derived.indexed_amount_available,
        };

        for w in &fields.warnings {
            warn!(
                id = %identifier,
                source = source_tag,
                row = raw.position,
                field = %w.field,
                raw = %w.raw,
                "field left unset: {}",
                w.reason
            );
        }
        if flags.negative_remainder {
            warn!(id = %identifier, "paid amount exceeds contract amount; remaining floored at 0");
        }
        if flags.remaining_overflow {
            warn!(id = %identifier, "remaining amount overflowed; shown as 0");
        }

        let description = fields.text(&cols.description);
        let record = CanonicalRecord {
            short_description: short_description(&description),
            description,
            historic_id: fields.text(&cols.historic_id),
            status: fields.text(&cols.status),
            location: fields.text(&cols.location),
            municipality: fields.text(&cols.municipality),
            modality: fields.text(&cols.modality),
            financing_requester: fields.text(&cols.financing_requester),
            budget_requester: fields.text(&cols.budget_requester),
            gdeba_file: fields.text(&cols.gdeba_file),
            identifier,

            contract_amount,
            paid_amount,
            remaining_amount: derived.remaining_amount,
            accrued_amount,
            updated_amount,
            remaining_updated_amount: derived.remaining_updated_amount,
            index_unit_value: current_index,
            indexed_amount: derived.indexed_amount,
            updated_balance: derived.updated_balance,
            percent_complete: derived.percent_complete,
            physical_progress,
            physical_progress_remaining: derived.physical_progress_remaining,
            financial_progress,
            uvi_quantity,
            uvi_remaining: derived.uvi_remaining,
            houses_total,
            houses_delivered,
            houses_remaining: derived.houses_remaining,
            venture_codes,
            work_codes,
            uvi_quote_date,
            last_update_date,

            flags,
            warnings: fields.warnings,
            formatted,

            source_tag: source_tag.to_string(),
            position: raw.position,
            processed_at: Utc::now(),
        };

        debug!(id = %record.identifier, source = source_tag, "normalized");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawValue;
    use rust_decimal_macros::dec;

    fn row(position: usize) -> RawRow {
        RawRow::new(position)
            .with("id_obra", "OTRAS-001")
            .with("descripcion", "Construcción de 40 viviendas. Etapa II con infraestructura.")
            .with("estado", "Paralizada")
            .with("localidad", "Tandil")
            .with("monto_convenio", 1234.5)
            .with("monto_pagado", "$ 234,50")
            .with("valor_uvi_convenio", 100.0)
            .with("valor_uvi_actual", 150.0)
            .with("porcentaje_avance_fisico", 57.0)
            .with("fecha_ultimo_pago", "2024-03-05")
    }

    #[test]
    fn normalizes_a_full_row() {
        let cfg = EngineConfig::default();
        let rec = Normalizer::new(&cfg).normalize(&row(2), "excel").unwrap();

        assert_eq!(rec.identifier, "OTRAS-001");
        assert_eq!(rec.short_description, "Construcción de 40 viviendas");
        assert_eq!(rec.status, "Paralizada");
        assert_eq!(rec.location, "Tandil");
        assert_eq!(rec.municipality, "");
        assert_eq!(rec.contract_amount, Some(dec!(1234.5)));
        assert_eq!(rec.paid_amount, Some(dec!(234.50)));
        assert_eq!(rec.remaining_amount, dec!(1000));
        assert_eq!(rec.indexed_amount, Some(dec!(1851.75)));
        assert!(rec.indexed_amount_available());
        assert_eq!(rec.physical_progress, Some(dec!(0.57)));
        assert_eq!(rec.formatted.contract_amount, "$1,234.50");
        assert_eq!(rec.formatted.remaining_amount, "$1,000.00");
        assert_eq!(rec.formatted.indexed_amount, "$1,851.75");
        assert_eq!(rec.formatted.physical_progress, "57.0%");
        assert_eq!(rec.formatted.physical_progress_remaining, "43.0%");
        assert_eq!(rec.formatted.last_update_date, "05/03/2024");
        assert_eq!(rec.formatted.accrued_amount, "--");
        assert_eq!(rec.source_tag, "excel");
        assert_eq!(rec.position, 2);
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn missing_identifier_reports_source_and_position() {
        let cfg = EngineConfig::default();
        let norm = Normalizer::new(&cfg);
        let blank = row(7).with("id_obra", "   ");
        assert_eq!(
            norm.normalize(&blank, "sheets").unwrap_err(),
            ValidationError::MissingIdentifier {
                source_tag: "sheets".into(),
                position: 7
            }
        );
        let mut absent = row(9);
        absent.cells.remove("id_obra");
        assert_eq!(norm.normalize(&absent, "excel").unwrap_err().position(), 9);
    }

    #[test]
    fn invalid_fields_warn_and_absent_fields_do_not() {
        let cfg = EngineConfig::default();
        let raw = row(3)
            .with("monto_pagado", "a confirmar")
            .with("fecha_ultimo_pago", "pendiente");
        let rec = Normalizer::new(&cfg).normalize(&raw, "excel").unwrap();

        assert_eq!(rec.paid_amount, None);
        assert_eq!(rec.last_update_date, None);
        assert!(rec.flags.incomplete_financials);
        assert_eq!(rec.remaining_amount, dec!(1234.5));
        let fields: Vec<&str> = rec.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["paid_amount", "last_update_date"]);
        assert_eq!(rec.warnings[0].raw, "a confirmar");
        assert_eq!(rec.formatted.paid_amount, "--");
    }

    #[test]
    fn current_index_falls_back_to_config() {
        let cfg = EngineConfig {
            current_index: Some(dec!(200)),
            ..EngineConfig::default()
        };
        let mut raw = row(4);
        raw.cells.remove("valor_uvi_actual");
        let rec = Normalizer::new(&cfg).normalize(&raw, "excel").unwrap();
        assert_eq!(rec.index_unit_value, Some(dec!(200)));
        assert_eq!(rec.indexed_amount, Some(dec!(2469)));

        raw.cells.remove("valor_uvi_convenio");
        let rec = Normalizer::new(&cfg).normalize(&raw, "excel").unwrap();
        assert!(!rec.indexed_amount_available());
        assert_eq!(rec.formatted.indexed_amount, "--");
    }

    #[test]
    fn idempotent_except_processed_at() {
        let cfg = EngineConfig::default();
        let norm = Normalizer::new(&cfg);
        let raw = row(5).with("monto_devengado", RawValue::Empty);
        let a = norm.normalize(&raw, "excel").unwrap();
        let b = norm.normalize(&raw, "excel").unwrap();
        assert_eq!(a, b);

        let c = norm.normalize(&raw, "sheets").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn short_description_truncates_on_words() {
        let long = "palabra ".repeat(40);
        let short = short_description(&long);
        assert!(short.ends_with('…'));
        assert!(short.chars().count() <= SHORT_DESCRIPTION_MAX + 1);
        assert_eq!(short_description("Una obra."), "Una obra");
        assert_eq!(short_description(""), "");
    }
}
