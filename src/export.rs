use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::identify::{self, Identifier};
use crate::report::{self, RenderError, ReportOptions, TruncatedSheet};
use crate::rules::MatchRules;
use crate::workbook::LoadedWorkbook;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("cannot create output directory {path}: {source}")]
    OutputDir { path: PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub report: ReportOptions,
    pub include_original: bool,
    /// Caller-assigned name for the pass-through copy; defaults to the source file name.
    pub original_name: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExportSummary {
    pub source: String,
    pub pdf_path: PathBuf,
    pub original_path: Option<PathBuf>,
    pub identifier: Option<Identifier>,
    pub page_count: usize,
    pub truncated: Vec<TruncatedSheet>,
    pub logo_drawn: bool,
}

/// One export run. Every file it writes gets a distinct name, so a later workbook never replaces an earlier report.
pub struct Exporter {
    options: ExportOptions,
    written: HashSet<PathBuf>,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self { Exporter { options, written: HashSet::new() } }

    pub fn options(&self) -> &ExportOptions { &self.options }

    /// Renders the report fully in memory, then writes `{identifier}.pdf` and, if asked, the untouched source bytes.
    pub fn export(&mut self, loaded: &LoadedWorkbook, rules: &MatchRules) -> Result<ExportSummary, ExportError> {
        let options = &self.options;
        let identifier = identify::extract_identifier(&loaded.workbook, rules);
        let rendered = report::render(&loaded.workbook, &options.report)?;
        if rendered.is_truncated() { log::info!("'{}': {} sheet(s) truncated to {} rows", loaded.source.name, rendered.truncated.len(), options.report.row_cap); }
        std::fs::create_dir_all(&options.out_dir).map_err(|e| ExportError::OutputDir { path: options.out_dir.clone(), source: e })?;

        let pdf_path = unclaimed_path(&options.out_dir, &identify::pdf_filename(identifier.as_ref()), &self.written);
        write_atomic(&pdf_path, &rendered.bytes)?;
        self.written.insert(pdf_path.clone());
        log::info!("Wrote {} ({} page(s))", pdf_path.to_string_lossy(), rendered.page_count);

        let original_path = if options.include_original {
            let name = original_file_name(options.original_name.as_deref().unwrap_or(&loaded.source.name));
            if options.out_dir.join(&name) == pdf_path {
                log::warn!("Original copy would overwrite the report; skipping {}", pdf_path.to_string_lossy());
                None
            } else {
                let dest = unclaimed_path(&options.out_dir, &name, &self.written);
                write_atomic(&dest, &loaded.source.bytes)?;
                self.written.insert(dest.clone());
                Some(dest)
            }
        } else { None };

        Ok(ExportSummary {
            source: loaded.source.name.clone(),
            pdf_path,
            original_path,
            identifier,
            page_count: rendered.page_count,
            truncated: rendered.truncated,
            logo_drawn: rendered.logo_drawn,
        })
    }
}

/// `dir/name`, or `dir/stem (N).ext` with the smallest N >= 2 not yet written in this run.
fn unclaimed_path(dir: &Path, name: &str, written: &HashSet<PathBuf>) -> PathBuf {
    let first = dir.join(name);
    if !written.contains(&first) { return first; }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !written.contains(&candidate) {
            log::warn!("{} was already written in this run; using {}", first.to_string_lossy(), candidate.to_string_lossy());
            return candidate;
        }
        n += 1;
    }
}

/// Final path component only, so a supplied name cannot escape the output directory.
fn original_file_name(name: &str) -> String {
    let base = Path::new(name.trim()).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    if base.is_empty() || base.chars().all(|c| c == '.') { "original.xlsx".to_string() } else { base }
}

/// Temp file in the destination directory, flushed, then renamed over `dest`.
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let err = |e: std::io::Error| ExportError::Write { path: dest.to_path_buf(), source: e };
    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(err)?;
    tmp.write_all(bytes).map_err(err)?;
    tmp.as_file().sync_all().map_err(err)?;
    tmp.persist(dest).map_err(|e| err(e.error))?;
    Ok(())
}
