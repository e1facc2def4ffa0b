use anyhow::{bail, Context, Result};
use obrareport::{
    render::{HtmlRenderer, RenderJob, RenderSummary, WkhtmltopdfRenderer},
    source::{uvi, ExcelReader, SheetsReader},
    EngineConfig, Normalizer, Pipeline, Scope, SourceBatch, SourceError,
};
use reqwest::Client;
use std::{fs, str::FromStr};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,obrareport=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");
    let start = Instant::now();

    // ─── 2) configuration ────────────────────────────────────────────
    let mut cfg = EngineConfig::load().context("loading configuration")?;
    let scope = Scope::from_str(&cfg.output.scope).context("parsing output scope")?;
    info!(?scope, out = %cfg.output.dir.display(), "configured");

    let client = Client::builder()
        .user_agent(concat!("obrareport/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    // ─── 3) current UVI, if not fixed ────────────────────────────────
    if cfg.current_index.is_none() && cfg.sources.fetch_current_index {
        match uvi::fetch_current_uvi(&client).await {
            Ok(Some(v)) => cfg.current_index = Some(v),
            Ok(None) => warn!("no current UVI available; indexed amounts stay unset"),
            Err(e) => warn!(error = %e, "fetching current UVI failed; indexed amounts stay unset"),
        }
    }

    // ─── 4) read sources ─────────────────────────────────────────────
    let required = cfg.columns.required();
    let mut sources: Vec<Result<SourceBatch, SourceError>> = Vec::new();

    if let Some(path) = cfg.sources.excel_path.clone() {
        let reader = ExcelReader::new(path)
            .sheet(cfg.sources.excel_sheet.clone())
            .header_row(cfg.sources.excel_header_row)
            .required_columns(&required);
        // calamine is blocking
        sources.push(tokio::task::spawn_blocking(move || reader.read()).await?);
    }
    if let Some(id) = cfg.sources.sheet_id.clone() {
        let reader = SheetsReader::new(client.clone(), id, cfg.columns.identifier.clone())
            .sheet_name(cfg.sources.sheet_name.clone())
            .keep_columns(cfg.sources.sheet_columns.clone())
            .required_columns(&required);
        sources.push(reader.read().await);
    }
    if sources.is_empty() {
        bail!("no source configured: set OBRAS_EXCEL_PATH or OBRAS_SHEET_ID");
    }

    // ─── 5) normalize → dedup → scope ────────────────────────────────
    let pipeline = Pipeline::new(Normalizer::new(&cfg));
    let outcome = pipeline
        .run_sources(sources, |r| scope.matches(r))
        .context("reading sources")?;
    let summary = outcome.summary();

    if outcome.records.is_empty() {
        warn!(?scope, "no records to render");
    }

    // ─── 6) render ───────────────────────────────────────────────────
    let job = RenderJob::from_config(&cfg).context("loading template")?;
    let rendered: RenderSummary = match &cfg.output.wkhtmltopdf {
        Some(program) => {
            let renderer = WkhtmltopdfRenderer::new(program.clone())
                .header_html(cfg.output.header_html.clone())
                .footer_html(cfg.output.footer_html.clone());
            job.render_all(&outcome.records, &renderer)?
        }
        None => job.render_all(&outcome.records, &HtmlRenderer)?,
    };

    // ─── 7) summary ──────────────────────────────────────────────────
    let report = serde_json::json!({
        "batch": &summary,
        "render": &rendered,
    });
    let summary_path = job.out_dir().join("resumen.json");
    fs::write(&summary_path, serde_json::to_vec_pretty(&report)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!(
        produced = summary.produced,
        skipped = summary.skipped,
        collisions = summary.collisions,
        rendered = rendered.rendered.len(),
        failed = rendered.failed.len(),
        elapsed = ?start.elapsed(),
        "done"
    );
    Ok(())
}
