use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::identify::Identifier;
use crate::workbook::{LoadedWorkbook, Sheet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

const BASE_CSS: &str = "body{margin:0;background:var(--bg);color:var(--fg);font-family:Segoe UI,system-ui,-apple-system,Arial,sans-serif} .container{max-width:1200px;margin:0 auto;padding:24px} .header{display:flex;align-items:center;justify-content:space-between;gap:12px;margin-bottom:16px} .title{font-size:20px;font-weight:600} .sub{color:var(--muted);font-size:13px} .grid{display:grid;grid-template-columns:repeat(4,minmax(0,1fr));gap:12px} .card{background:var(--card);border:1px solid var(--border);border-radius:10px;padding:14px} .metric .label{color:var(--muted);font-size:12px} .metric .value{font-size:20px;font-weight:700;word-break:break-all} .section{margin-top:18px} .section h3{margin:0 0 10px 0;font-size:16px;font-weight:600} .scroll{overflow-x:auto} .table{width:100%;border-collapse:separate;border-spacing:0;background:var(--card);border:1px solid var(--border);border-radius:10px;overflow:hidden;font-size:13px} .table th{position:sticky;top:0;background:var(--head);color:#ffffff;text-align:center;font-weight:600;padding:8px;border-bottom:1px solid var(--border)} .table td{padding:6px 8px;border-bottom:1px solid var(--border);vertical-align:top} .table tr:nth-child(even) td{background:var(--stripe)} .num{text-align:right;font-variant-numeric:tabular-nums} .notice{font-style:italic;color:var(--muted)} .pill{display:inline-block;background:var(--chip);padding:4px 10px;border-radius:999px;border:1px solid var(--border);font-size:12px;margin:4px 6px 0 0} .footer{margin-top:22px;color:var(--muted);font-size:12px} @media (max-width:900px){.grid{grid-template-columns:repeat(2,minmax(0,1fr))}}";

fn theme_vars(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => ":root{--bg:#0a0e13;--fg:#ffffff;--muted:#c0c4cc;--card:#0d131a;--border:#243041;--head:#2f3b52;--stripe:#0b0f14;--chip:#0f172a}",
        Theme::Light => ":root{--bg:#f7fafc;--fg:#111827;--muted:#6b7280;--card:#ffffff;--border:#d3dae6;--head:#2f3b52;--stripe:#f7f9fc;--chip:#eef2f7}",
    }
}

/// Standalone preview page: one table per sheet in workbook order, missing values left blank.
pub fn render_workbook_html(loaded: &LoadedWorkbook, identifier: Option<&Identifier>, theme: Theme, max_rows: Option<usize>, footer: &str) -> String {
    let wb = &loaded.workbook;
    let mut s = String::new();
    s.push_str(&format!("<html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>{}</title><style>", html_escape(&loaded.source.name)));
    s.push_str(theme_vars(theme));
    s.push(' ');
    s.push_str(BASE_CSS);
    s.push_str("</style></head><body><div class=\"container\">");
    s.push_str(&format!("<div class=\"header\"><div class=\"title\">Lab Results · {}</div>", html_escape(&loaded.source.name)));
    match identifier {
        Some(id) => s.push_str(&format!("<span class=\"pill\">{} · {}</span>", html_escape(&id.field), html_escape(&id.value))),
        None => s.push_str("<span class=\"pill\">No sample id found</span>"),
    }
    s.push_str("</div>");

    let total_rows: usize = wb.sheets.iter().map(Sheet::rows).sum();
    s.push_str("<div class=\"grid\">");
    for (label, value) in [
        ("Sheets", wb.sheets.len().to_string()),
        ("Rows", total_rows.to_string()),
        ("Sample ID", identifier.map(|i| i.value.clone()).unwrap_or_else(|| "-".to_string())),
        ("File size", format!("{:.1} KiB", loaded.source.bytes.len() as f64 / 1024.0)),
    ] {
        s.push_str(&format!("<div class=\"card metric\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>", label, html_escape(&value)));
    }
    s.push_str("</div>");

    if wb.sheets.is_empty() { s.push_str("<div class=\"section notice\">No sheets found in the workbook.</div>"); }
    for sheet in &wb.sheets {
        s.push_str(&format!("<div class=\"section\"><h3>Sheet: {}</h3>", html_escape(&sheet.name)));
        sheet_table(&mut s, sheet, max_rows);
        s.push_str("</div>");
    }
    s.push_str(&format!("<div class=\"footer\">{}</div></div></body></html>", html_escape(footer)));
    s
}

fn sheet_table(s: &mut String, sheet: &Sheet, max_rows: Option<usize>) {
    if sheet.is_empty() {
        s.push_str("<div class=\"card notice\">(No rows)</div>");
        return;
    }
    let shown = max_rows.map_or(sheet.rows(), |m| m.min(sheet.rows()));
    s.push_str("<div class=\"scroll\"><table class=\"table\"><thead><tr>");
    for name in sheet.column_names() { s.push_str(&format!("<th>{}</th>", html_escape(name))); }
    s.push_str("</tr></thead><tbody>");
    for row in 0..shown {
        s.push_str("<tr>");
        for (c, col) in sheet.columns.iter().enumerate() {
            let cls = if col.data.is_numeric() { " class=\"num\"" } else { "" };
            s.push_str(&format!("<td{}>{}</td>", cls, html_escape(&sheet.cell_text(row, c).unwrap_or_default())));
        }
        s.push_str("</tr>");
    }
    s.push_str("</tbody></table></div>");
    if shown < sheet.rows() { s.push_str(&format!("<div class=\"sub\">Showing first {} of {} rows.</div>", shown, sheet.rows())); }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
