use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;
use walkdir::WalkDir;

pub const DEFAULT_GLOB: &str = "*.xlsx";

#[derive(Debug, thiserror::Error)]
pub enum LabDirError {
    #[error("lab directory {0} does not exist")]
    Missing(PathBuf),
    #[error("invalid glob '{pattern}': {reason}")]
    Glob { pattern: String, reason: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct LabFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

fn matcher(pattern: &str) -> Result<GlobMatcher, LabDirError> {
    GlobBuilder::new(pattern).case_insensitive(true).literal_separator(true).build()
        .map(|g| g.compile_matcher())
        .map_err(|e| LabDirError::Glob { pattern: pattern.to_string(), reason: e.to_string() })
}

/// Workbooks under `root` whose file name matches `glob`, sorted by name. Office lock files (`~$...`) are skipped.
pub fn list_workbooks(root: &Path, glob: Option<&str>, recursive: bool) -> Result<Vec<LabFile>, LabDirError> {
    if !root.is_dir() { return Err(LabDirError::Missing(root.to_path_buf())); }
    let m = matcher(glob.unwrap_or(DEFAULT_GLOB))?;
    let wd = if recursive { WalkDir::new(root) } else { WalkDir::new(root).max_depth(1) };
    let mut out = Vec::new();
    for de in wd.follow_links(false).into_iter().filter_map(Result::ok) {
        if !de.file_type().is_file() { continue; }
        let name = de.file_name().to_string_lossy().into_owned();
        if name.starts_with("~$") || !m.is_match(&name) { continue; }
        let meta = match de.metadata() { Ok(md) => md, Err(e) => { log::warn!("Skipping {}: {}", de.path().to_string_lossy(), e); continue } };
        out.push(LabFile { name, path: de.path().to_path_buf(), size: meta.len(), modified: meta.modified().ok() });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    log::debug!("Found {} workbook(s) in {}", out.len(), root.to_string_lossy());
    Ok(out)
}

#[cfg(test)]
mod tests_lab_dir {
    use super::*;

    fn touch(p: &Path) { std::fs::write(p, b"x").unwrap(); }

    #[test]
    fn lists_sorted_xlsx_only() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["TP_2.xlsx", "TP_1.XLSX", "notes.txt", "~$TP_1.xlsx", "old.xls"] { touch(&dir.path().join(n)); }
        std::fs::create_dir(dir.path().join("archive")).unwrap();
        touch(&dir.path().join("archive").join("TP_0.xlsx"));
        let names: Vec<String> = list_workbooks(dir.path(), None, false).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["TP_1.XLSX", "TP_2.xlsx"]);
        let deep: Vec<String> = list_workbooks(dir.path(), None, true).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(deep, vec!["TP_0.xlsx", "TP_1.XLSX", "TP_2.xlsx"]);
    }

    #[test]
    fn custom_glob_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.xls"));
        touch(&dir.path().join("b.xlsx"));
        let names: Vec<String> = list_workbooks(dir.path(), Some("*.xls*"), false).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a.xls", "b.xlsx"]);
        assert!(matches!(list_workbooks(&dir.path().join("nope"), None, false), Err(LabDirError::Missing(_))));
        assert!(matches!(list_workbooks(dir.path(), Some("[bad"), false), Err(LabDirError::Glob { .. })));
    }
}
