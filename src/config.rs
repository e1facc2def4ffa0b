// src/config.rs
//
// Engine configuration. Everything the formatters, the calculation engine and
// the readers need is passed explicitly through `EngineConfig`; nothing reads
// process state except `EngineConfig::load`.

use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf, str::FromStr};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub format: FormatConfig,
    pub calc: CalcPolicy,
    pub columns: ColumnMap,
    /// Fixed current index value (UVI). When unset the binary may fetch it.
    pub current_index: Option<Decimal>,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// 0.005 → 0.01
    HalfUp,
    /// 0.005 → 0.00, 0.015 → 0.02
    HalfEven,
}

impl RoundingMode {
    pub fn strategy(self) -> rust_decimal::RoundingStrategy {
        match self {
            RoundingMode::HalfUp => rust_decimal::RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => rust_decimal::RoundingStrategy::MidpointNearestEven,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub currency_symbol: String,
    pub thousands_separator: char,
    pub decimal_separator: char,
    /// Rendered for every unset value.
    pub placeholder: String,
    /// chrono format string for rendered dates.
    pub date_format: String,
    /// `05/03/2024` is 5 March when true, May 3rd when false.
    pub day_first: bool,
    pub rounding: RoundingMode,
}

impl FormatConfig {
    /// Reject a `date_format` chrono cannot render.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidValue {
                key: "format.date_format".into(),
                value: self.date_format.clone(),
            });
        }
        Ok(())
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "$".into(),
            thousands_separator: ',',
            decimal_separator: '.',
            placeholder: "--".into(),
            date_format: "%d/%m/%Y".into(),
            day_first: true,
            rounding: RoundingMode::HalfUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePolicy {
    /// Keep negative inputs in the arithmetic.
    Accept,
    /// Replace negative inputs with zero before computing.
    ClampToZero,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcPolicy {
    pub negative_inputs: NegativePolicy,
    /// Separator assumed when a numeric text holds a single ambiguous `.` or `,`.
    pub text_decimal_separator: char,
}

impl Default for CalcPolicy {
    fn default() -> Self {
        Self {
            negative_inputs: NegativePolicy::Accept,
            text_decimal_separator: '.',
        }
    }
}

/// Column names the normalizer looks up. Spelling and casing must match the
/// readers' headers exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub identifier: String,
    pub historic_id: String,
    pub description: String,
    pub status: String,
    pub location: String,
    pub municipality: String,
    pub modality: String,
    pub financing_requester: String,
    pub budget_requester: String,
    pub gdeba_file: String,
    pub venture_codes: String,
    pub work_codes: String,
    pub contract_amount: String,
    pub paid_amount: String,
    pub accrued_amount: String,
    pub updated_amount: String,
    pub base_index: String,
    pub current_index: String,
    pub uvi_quantity: String,
    /// UVIs already certified/paid against the agreement.
    pub uvi_paid: String,
    pub uvi_quote_date: String,
    pub houses_total: String,
    pub houses_delivered: String,
    pub physical_progress: String,
    pub financial_progress: String,
    pub last_update_date: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            identifier: "id_obra".into(),
            historic_id: "id_historico".into(),
            description: "descripcion".into(),
            status: "estado".into(),
            location: "localidad".into(),
            municipality: "municipio".into(),
            modality: "modalidad".into(),
            financing_requester: "solicitante_financiero".into(),
            budget_requester: "solicitante_presupuestario".into(),
            gdeba_file: "expediente_gdeba".into(),
            venture_codes: "emprendimiento_incluidos".into(),
            work_codes: "codigos_incluidos".into(),
            contract_amount: "monto_convenio".into(),
            paid_amount: "monto_pagado".into(),
            accrued_amount: "monto_devengado".into(),
            updated_amount: "monto_actualizado".into(),
            base_index: "valor_uvi_convenio".into(),
            current_index: "valor_uvi_actual".into(),
            uvi_quantity: "cantidad_uvis".into(),
            uvi_paid: "uvi_pagadas".into(),
            uvi_quote_date: "fecha_cotizacion_uvi_convenio".into(),
            houses_total: "viv_totales".into(),
            houses_delivered: "viv_entregadas".into(),
            physical_progress: "porcentaje_avance_fisico".into(),
            financial_progress: "avance_financiero".into(),
            last_update_date: "fecha_ultimo_pago".into(),
        }
    }
}

impl ColumnMap {
    /// Columns a source must carry for the report to make sense.
    pub fn required(&self) -> Vec<&str> {
        vec![
            self.identifier.as_str(),
            self.description.as_str(),
            self.contract_amount.as_str(),
            self.paid_amount.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub excel_path: Option<PathBuf>,
    pub excel_sheet: Option<String>,
    /// Zero-based row that holds the headers.
    pub excel_header_row: usize,
    pub sheet_id: Option<String>,
    pub sheet_name: Option<String>,
    /// When non-empty, the sheets reader keeps only these columns.
    pub sheet_columns: Vec<String>,
    pub fetch_current_index: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            excel_path: None,
            excel_sheet: None,
            excel_header_row: 0,
            sheet_id: None,
            sheet_name: None,
            sheet_columns: Vec::new(),
            fetch_current_index: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub template: Option<PathBuf>,
    /// Path to the HTML→PDF converter. `None` writes HTML files instead.
    pub wkhtmltopdf: Option<PathBuf>,
    /// Page header/footer markup handed to the converter.
    pub header_html: Option<PathBuf>,
    pub footer_html: Option<PathBuf>,
    /// Name → inline asset (data URI, base64 font...) made available to templates.
    pub assets: BTreeMap<String, String>,
    pub scope: String,
    pub program_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("informes"),
            template: None,
            wkhtmltopdf: None,
            header_html: None,
            footer_html: None,
            assets: BTreeMap::new(),
            scope: "TODAS".into(),
            program_name: "Programa COMPLETAR".into(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document. Missing sections fall back to defaults.
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.format.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Defaults, then the YAML file named by `OBRAS_CONFIG`, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match env::var("OBRAS_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(Path::new(&path))?,
            _ => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply `OBRAS_*` overrides from `lookup`. Split out from `load` so the
    /// override rules can be exercised without touching the process env.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OBRAS_EXCEL_PATH") {
            self.sources.excel_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("OBRAS_SHEET_ID") {
            self.sources.sheet_id = Some(v);
        }
        if let Some(v) = get("OBRAS_SHEET_NAME") {
            self.sources.sheet_name = Some(v);
        }
        if let Some(v) = get("OBRAS_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
        if let Some(v) = get("OBRAS_TEMPLATE") {
            self.output.template = Some(PathBuf::from(v));
        }
        if let Some(v) = get("OBRAS_WKHTMLTOPDF") {
            self.output.wkhtmltopdf = Some(PathBuf::from(v));
        }
        if let Some(v) = get("OBRAS_SCOPE") {
            self.output.scope = v.trim().to_uppercase();
        }
        if let Some(v) = get("OBRAS_CURRENT_UVI") {
            let value = Decimal::from_str(v.trim()).map_err(|_| ConfigError::InvalidValue {
                key: "OBRAS_CURRENT_UVI".into(),
                value: v.clone(),
            })?;
            self.current_index = Some(value);
        }
        if let Some(v) = get("OBRAS_FETCH_UVI") {
            self.sources.fetch_current_index = matches!(v.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn yaml_sections_fall_back_to_defaults() {
        let yaml = r#"
format:
  currency_symbol: "ARS "
  thousands_separator: "."
  decimal_separator: ","
current_index: "1234.56"
columns:
  identifier: ID
"#;
        let cfg = EngineConfig::from_yaml_str(yaml, Path::new("test.yaml")).unwrap();
        assert_eq!(cfg.format.currency_symbol, "ARS ");
        assert_eq!(cfg.format.thousands_separator, '.');
        assert_eq!(cfg.format.placeholder, "--");
        assert_eq!(cfg.format.rounding, RoundingMode::HalfUp);
        assert_eq!(cfg.columns.identifier, "ID");
        assert_eq!(cfg.columns.paid_amount, "monto_pagado");
        assert_eq!(cfg.current_index, Some(dec!(1234.56)));
        assert_eq!(cfg.calc.negative_inputs, NegativePolicy::Accept);
    }

    #[test]
    fn broken_yaml_is_a_parse_error() {
        let err = EngineConfig::from_yaml_str("format: [", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unusable_date_format_is_rejected() {
        let yaml = "format:\n  date_format: \"%d/%Q\"\n";
        let err = EngineConfig::from_yaml_str(yaml, Path::new("fmt.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "format.date_format"));

        let yaml = "format:\n  date_format: \"%Y-%m-%d\"\n";
        assert!(EngineConfig::from_yaml_str(yaml, Path::new("fmt.yaml")).is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("OBRAS_SHEET_ID", "abc123"),
            ("OBRAS_SCOPE", " otras "),
            ("OBRAS_CURRENT_UVI", "1500.25"),
            ("OBRAS_EXCEL_PATH", ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.sources.sheet_id.as_deref(), Some("abc123"));
        assert_eq!(cfg.output.scope, "OTRAS");
        assert_eq!(cfg.current_index, Some(dec!(1500.25)));
        assert!(cfg.sources.excel_path.is_none());
    }

    #[test]
    fn bad_uvi_override_is_rejected() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "OBRAS_CURRENT_UVI").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
