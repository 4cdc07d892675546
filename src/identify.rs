use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::rules::{HeaderRole, MatchRules};
use crate::workbook::Workbook;

pub const FALLBACK_PDF_NAME: &str = "Lab_Results_Summary.pdf";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub sheet: String,
    pub field: String,
    pub value: String,
}

/// Trim, lower-case, collapse underscore/whitespace runs, drop a trailing colon.
pub fn normalize_field(s: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new(r"[_\s]+").expect("valid regex"));
    let collapsed = re.replace_all(s.trim(), " ").to_lowercase();
    collapsed.trim().trim_end_matches(':').trim().to_string()
}

/// First sample identifier in sheet order, or `None` when no sheet has a non-empty match.
pub fn extract_identifier(workbook: &Workbook, rules: &MatchRules) -> Option<Identifier> {
    for sheet in &workbook.sheets {
        let field_col = sheet.columns.iter().position(|c| rules.role_of(&c.name) == Some(HeaderRole::Field));
        let value_col = sheet.columns.iter().position(|c| rules.role_of(&c.name) == Some(HeaderRole::Value));
        let (Some(f), Some(v)) = (field_col, value_col) else { continue };
        let hit = (0..sheet.rows()).find(|&row| sheet.cell_text(row, f).is_some_and(|t| rules.is_target(&normalize_field(&t))));
        let Some(row) = hit else { continue };
        let value = sheet.cell_text(row, v).map(|t| t.trim().to_string()).unwrap_or_default();
        if value.is_empty() {
            log::debug!("Sheet '{}' names a sample id but its value is empty", sheet.name);
            continue;
        }
        let field = sheet.cell_text(row, f).unwrap_or_default().trim().to_string();
        return Some(Identifier { sheet: sheet.name.clone(), field, value });
    }
    None
}

/// `{identifier}.pdf`, or the fixed fallback name.
pub fn pdf_filename(id: Option<&Identifier>) -> String {
    let stem = id.map(|i| sanitize_file_stem(&i.value)).filter(|s| !s.is_empty());
    match stem { Some(s) => format!("{}.pdf", s), None => FALLBACK_PDF_NAME.to_string() }
}

fn sanitize_file_stem(s: &str) -> String {
    let cleaned: String = s.chars().map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '_' } else { c }).collect();
    cleaned.trim().trim_matches('.').to_string()
}
