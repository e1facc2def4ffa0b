use anyhow::{Context, Result};
use obrareport::{source::ExcelReader, EngineConfig, Normalizer, Pipeline};
use std::{env, path::PathBuf, process::exit};
use tracing_subscriber::{fmt, EnvFilter};

/// Normalize one workbook and print records + batch summary as JSON on stdout.
fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <EXCEL_FILE> [SHEET]", args[0]);
        exit(1);
    }
    let path = PathBuf::from(&args[1]);

    let cfg = EngineConfig::load().context("loading configuration")?;
    let sheet = args.get(2).cloned().or_else(|| cfg.sources.excel_sheet.clone());
    let batch = ExcelReader::new(&path)
        .sheet(sheet)
        .header_row(cfg.sources.excel_header_row)
        .required_columns(&cfg.columns.required())
        .read()
        .with_context(|| format!("reading {}", path.display()))?;

    let outcome = Pipeline::new(Normalizer::new(&cfg)).run_batch(&[batch], |_| true);

    let out = serde_json::json!({
        "records": &outcome.records,
        "collisions": &outcome.collisions,
        "summary": outcome.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
