// src/render/mod.rs
//
// Record → HTML report. Everything shown comes from the record's text fields
// and its pre-formatted strings; no formatting happens here.

pub mod document;

pub use document::{DocumentRenderer, HtmlRenderer, RenderJob, RenderSummary, WkhtmltopdfRenderer};

use crate::error::RenderError;
use crate::record::CanonicalRecord;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid placeholder regex"));

static UNSAFE_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("valid filename regex"));

pub const DEFAULT_TEMPLATE: &str = include_str!("default_template.html");

/// Key → display string map a template is filled from.
pub type TemplateContext = BTreeMap<String, String>;

fn or_placeholder(text: &str, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text.to_string()
    }
}

/// Build the template context for one record. Every asset is exposed under its
/// own name; blank text fields show `placeholder`.
pub fn template_context(
    record: &CanonicalRecord,
    assets: &BTreeMap<String, String>,
    program_name: &str,
    placeholder: &str,
) -> TemplateContext {
    let f = &record.formatted;
    let text = |s: &str| or_placeholder(s, placeholder);

    let mut ctx: TemplateContext = assets.clone();
    let entries = [
        // identity
        ("ID_obra", record.identifier.clone()),
        ("ID_historico", text(&record.historic_id)),
        ("Memoria_Descriptiva", text(&record.description)),
        ("Descripcion_Corta", text(&record.short_description)),
        ("Estado", text(&record.status)),
        ("Municipio", text(&record.municipality)),
        ("Localidad", text(&record.location)),
        ("Modalidad", text(&record.modality)),
        ("Programa", program_name.to_string()),
        ("Solicitante_Financiamiento", text(&record.financing_requester)),
        ("Solicitante_Presupuestario", text(&record.budget_requester)),
        ("Exp_GDEBA", record.gdeba_file.clone()),
        ("Cod_emprendimiento", f.venture_codes.clone()),
        ("Cod_obra", f.work_codes.clone()),
        // financials
        ("Monto_Convenio", f.contract_amount.clone()),
        ("Monto_Pagado", f.paid_amount.clone()),
        ("Monto_Restante", f.remaining_amount.clone()),
        ("Monto_Devengado", f.accrued_amount.clone()),
        ("Monto_Actualizado", f.updated_amount.clone()),
        ("Monto_Restante_Actualizado", f.remaining_updated_amount.clone()),
        ("Monto_Indexado", f.indexed_amount.clone()),
        ("Porcentaje_Pagado", f.percent_complete.clone()),
        ("Fecha_ultimo_pago", f.last_update_date.clone()),
        // UVI
        ("Fecha_UVI", f.uvi_quote_date.clone()),
        ("Valor_UVI", f.index_unit_value.clone()),
        ("Total_UVI", f.uvi_quantity.clone()),
        ("Uvis_Restantes", f.uvi_remaining.clone()),
        ("Saldo_Actualizado", f.updated_balance.clone()),
        // progress
        ("Avance_fisico", f.physical_progress.clone()),
        ("Avance_Restante", f.physical_progress_remaining.clone()),
        ("Avance_financiero", f.financial_progress.clone()),
        // housing
        ("Viviendas_Totales", f.houses_total.clone()),
        ("Viviendas_Entregadas", f.houses_delivered.clone()),
        ("Viviendas_Restantes", f.houses_remaining.clone()),
    ];
    for (key, value) in entries {
        ctx.insert(key.to_string(), value);
    }
    ctx
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace every `{{ key }}` with the HTML-escaped context value. Unknown
/// keys render empty.
pub fn fill_template(template: &str, ctx: &TemplateContext) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            ctx.get(&caps[1])
                .map(|v| escape_html(v))
                .unwrap_or_default()
        })
        .into_owned()
}

/// `informe_<id>.pdf` with path-hostile characters removed.
pub fn safe_filename(identifier: &str) -> String {
    let name = UNSAFE_FILENAME_RE
        .replace_all(&format!("informe_{}", identifier), "")
        .into_owned();
    if name.ends_with(".pdf") {
        name
    } else {
        format!("{}.pdf", name)
    }
}

/// Template from disk, or the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<String, RenderError> {
    match path {
        Some(p) => Ok(fs::read_to_string(p)?),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::normalize::Normalizer;
    use crate::record::RawRow;

    fn record() -> CanonicalRecord {
        let cfg = EngineConfig::default();
        let row = RawRow::new(2)
            .with("id_obra", "OTRAS-010")
            .with("descripcion", "Construcción de 24 viviendas. Incluye <infraestructura>.")
            .with("monto_convenio", 2000.0)
            .with("monto_pagado", 500.0)
            .with("viv_totales", 24.0)
            .with("viv_entregadas", 6.0);
        Normalizer::new(&cfg).normalize(&row, "excel").unwrap()
    }

    #[test]
    fn context_uses_formatted_strings_and_placeholders() {
        let mut assets = BTreeMap::new();
        assets.insert("banner".to_string(), "data:image/png;base64,AAAA".to_string());

        let ctx = template_context(&record(), &assets, "Programa COMPLETAR", "--");
        assert_eq!(ctx["ID_obra"], "OTRAS-010");
        assert_eq!(ctx["Monto_Convenio"], "$2,000.00");
        assert_eq!(ctx["Monto_Restante"], "$1,500.00");
        assert_eq!(ctx["Viviendas_Restantes"], "18");
        assert_eq!(ctx["Estado"], "--");
        assert_eq!(ctx["Exp_GDEBA"], "");
        assert_eq!(ctx["Descripcion_Corta"], "Construcción de 24 viviendas");
        assert_eq!(ctx["Programa"], "Programa COMPLETAR");
        assert_eq!(ctx["banner"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn fill_template_escapes_and_blanks_unknown_keys() {
        let ctx = template_context(&record(), &BTreeMap::new(), "P", "--");
        let html = fill_template("<p>{{Memoria_Descriptiva}}</p><i>{{ nope }}</i><b>{{ ID_obra }}</b>", &ctx);
        assert_eq!(
            html,
            "<p>Construcción de 24 viviendas. Incluye &lt;infraestructura&gt;.</p><i></i><b>OTRAS-010</b>"
        );
    }

    #[test]
    fn default_template_has_no_unfilled_keys() {
        let ctx = template_context(&record(), &BTreeMap::new(), "P", "--");
        let html = fill_template(DEFAULT_TEMPLATE, &ctx);
        assert!(!html.contains("{{"));
        assert!(html.contains("OTRAS-010"));
    }

    #[test]
    fn safe_filenames() {
        assert_eq!(safe_filename("OTRAS-001"), "informe_OTRAS-001.pdf");
        assert_eq!(safe_filename("CONVE/12:3?"), "informe_CONVE123.pdf");
        assert_eq!(safe_filename("x.pdf"), "informe_x.pdf");
    }
}
