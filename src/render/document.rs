// src/render/document.rs
use crate::config::EngineConfig;
use crate::error::RenderError;
use crate::record::CanonicalRecord;
use crate::render::{fill_template, load_template, safe_filename, template_context};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, instrument, warn};

/// Turns filled-in HTML into an output file.
pub trait DocumentRenderer {
    /// File extension of the produced documents, without the dot.
    fn extension(&self) -> &str;
    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError>;
}

/// Writes the markup unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn extension(&self) -> &str {
        "html"
    }

    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        fs::write(output, html)?;
        Ok(())
    }
}

/// Shells out to `wkhtmltopdf`, feeding the HTML on stdin.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    program: PathBuf,
    header_html: Option<PathBuf>,
    footer_html: Option<PathBuf>,
    encoding: String,
}

impl WkhtmltopdfRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            header_html: None,
            footer_html: None,
            encoding: "UTF-8".into(),
        }
    }

    pub fn header_html(mut self, path: Option<PathBuf>) -> Self {
        self.header_html = path;
        self
    }

    pub fn footer_html(mut self, path: Option<PathBuf>) -> Self {
        self.footer_html = path;
        self
    }

    fn args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--quiet",
            "--enable-local-file-access",
            "--margin-top",
            "30mm",
            "--margin-bottom",
            "20mm",
            "--margin-left",
            "4mm",
            "--margin-right",
            "4mm",
            "--encoding",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(OsString::from(&self.encoding));
        if let Some(h) = &self.header_html {
            args.push("--header-html".into());
            args.push(h.clone().into_os_string());
        }
        if let Some(f) = &self.footer_html {
            args.push("--footer-html".into());
            args.push(f.clone().into_os_string());
        }
        // read from stdin
        args.push("-".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl DocumentRenderer for WkhtmltopdfRenderer {
    fn extension(&self) -> &str {
        "pdf"
    }

    fn render(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        let mut child = Command::new(&self.program)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(html.as_bytes())?;
        }
        let out = child.wait_with_output()?;
        if !out.status.success() {
            return Err(RenderError::Converter {
                program: self.program.display().to_string(),
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderFailure {
    pub identifier: String,
    pub error: String,
    /// Where the offending HTML was dumped, if that worked.
    pub debug_html: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderSummary {
    pub rendered: Vec<PathBuf>,
    pub failed: Vec<RenderFailure>,
}

/// One file name per record. Identifiers that clean up to the same name
/// (compared case-insensitively) get a `_<position>` suffix each.
fn output_names(records: &[CanonicalRecord]) -> Vec<String> {
    let bases: Vec<String> = records.iter().map(|r| safe_filename(&r.identifier)).collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for b in &bases {
        *counts.entry(b.to_lowercase()).or_default() += 1;
    }
    let mut taken: HashSet<String> = bases
        .iter()
        .map(|b| b.to_lowercase())
        .filter(|b| counts[b] == 1)
        .collect();

    bases
        .into_iter()
        .zip(records)
        .map(|(base, rec)| {
            if counts[&base.to_lowercase()] == 1 {
                return base;
            }
            let stem = base.trim_end_matches(".pdf");
            let mut name = format!("{}_{}.pdf", stem, rec.position);
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}_{}_{}.pdf", stem, rec.position, n);
                n += 1;
            }
            warn!(id = %rec.identifier, file = %name, "output file name clashes; suffixed");
            name
        })
        .collect()
}

/// Template plus everything needed to fill it, bound to one output directory.
#[derive(Debug, Clone)]
pub struct RenderJob {
    template: String,
    assets: BTreeMap<String, String>,
    program_name: String,
    placeholder: String,
    out_dir: PathBuf,
}

impl RenderJob {
    pub fn new(template: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            assets: BTreeMap::new(),
            program_name: String::new(),
            placeholder: "--".into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Result<Self, RenderError> {
        let template = load_template(cfg.output.template.as_deref())?;
        Ok(Self {
            template,
            assets: cfg.output.assets.clone(),
            program_name: cfg.output.program_name.clone(),
            placeholder: cfg.format.placeholder.clone(),
            out_dir: cfg.output.dir.clone(),
        })
    }

    pub fn assets(mut self, assets: BTreeMap<String, String>) -> Self {
        self.assets = assets;
        self
    }

    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn html_for(&self, record: &CanonicalRecord) -> String {
        let ctx = template_context(record, &self.assets, &self.program_name, &self.placeholder);
        fill_template(&self.template, &ctx)
    }

    fn render_one<R: DocumentRenderer>(
        &self,
        record: &CanonicalRecord,
        file_name: &str,
        renderer: &R,
    ) -> Result<PathBuf, RenderFailure> {
        let html = self.html_for(record);
        let path = self.out_dir.join(file_name).with_extension(renderer.extension());

        match renderer.render(&html, &path) {
            Ok(()) => Ok(path),
            Err(e) => {
                let stem = file_name
                    .trim_start_matches("informe_")
                    .trim_end_matches(".pdf");
                let dump = self.out_dir.join(format!("error_{}.html", stem));
                let debug_html = match fs::write(&dump, &html) {
                    Ok(()) => Some(dump),
                    Err(io) => {
                        warn!(id = %record.identifier, error = %io, "could not dump failing HTML");
                        None
                    }
                };
                warn!(id = %record.identifier, error = %e, "render failed");
                Err(RenderFailure {
                    identifier: record.identifier.clone(),
                    error: e.to_string(),
                    debug_html,
                })
            }
        }
    }

    /// Render every record. Individual failures are collected, not fatal;
    /// only failing to create the output directory is.
    #[instrument(level = "info", skip_all, fields(records = records.len(), out = %self.out_dir.display()))]
    pub fn render_all<R>(
        &self,
        records: &[CanonicalRecord],
        renderer: &R,
    ) -> Result<RenderSummary, RenderError>
    where
        R: DocumentRenderer + Sync,
    {
        fs::create_dir_all(&self.out_dir)?;

        let names = output_names(records);
        let results: Vec<_> = records
            .par_iter()
            .zip(names.par_iter())
            .map(|(rec, name)| self.render_one(rec, name, renderer))
            .collect();

        let mut summary = RenderSummary::default();
        for r in results {
            match r {
                Ok(path) => summary.rendered.push(path),
                Err(f) => summary.failed.push(f),
            }
        }
        info!(
            rendered = summary.rendered.len(),
            failed = summary.failed.len(),
            "render complete"
        );
        Ok(summary)
    }
}
