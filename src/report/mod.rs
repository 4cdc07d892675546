//! PDF summary of a workbook: a title block, then one block per sheet.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimeZone;
use crate::workbook::Workbook;

pub mod layout;
pub mod logo;
pub mod metrics;
pub mod pdf;

use layout::{Decorations, Flow, Geometry, HEADING, NORMAL, NOTICE, TITLE};

pub const DEFAULT_TITLE: &str = "Lab Results Summary";
pub const DEFAULT_FOOTER: &str = "admin@nellie.tech  |  The information contained is private and confidential. All rights reserved.";
pub const DEFAULT_LOGO: &str = "assets/nellie_wordmark.png";
pub const DEFAULT_ROW_CAP: usize = 60;
pub const EMPTY_NOTICE: &str = "(No rows)";

/// Room wanted below a sheet heading before committing it to the current page.
const HEADING_FOLLOW: f32 = 40.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("sheet '{sheet}' contains '{ch}', which the report font cannot encode")]
    Unencodable { sheet: String, ch: char },
    #[error("report layout failed: {0}")]
    Layout(String),
    #[error("PDF assembly failed: {0}")]
    Pdf(String),
    #[error("PDF serialisation failed: {0}")]
    Write(String),
}

#[derive(Clone, Debug)]
pub struct ReportOptions {
    pub title: String,
    pub orientation: Orientation,
    /// Maximum data rows printed per sheet.
    pub row_cap: usize,
    pub footer: String,
    pub logo: Option<PathBuf>,
    pub generated_at: DateTime<Utc>,
    pub time_zone: TimeZone,
    /// Fail instead of substituting `?` for characters the base fonts lack.
    pub strict_encoding: bool,
    pub compress: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            title: DEFAULT_TITLE.to_string(),
            orientation: Orientation::Portrait,
            row_cap: DEFAULT_ROW_CAP,
            footer: DEFAULT_FOOTER.to_string(),
            logo: Some(PathBuf::from(DEFAULT_LOGO)),
            generated_at: Utc::now(),
            time_zone: TimeZone::default(),
            strict_encoding: false,
            compress: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TruncatedSheet {
    pub sheet: String,
    pub total_rows: usize,
    pub printed_rows: usize,
}

#[derive(Clone, Debug)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub truncated: Vec<TruncatedSheet>,
    pub logo_drawn: bool,
}

impl RenderedReport {
    pub fn is_truncated(&self) -> bool { !self.truncated.is_empty() }
}

pub fn generated_stamp(at: DateTime<Utc>, tz: TimeZone) -> String {
    const FMT: &str = "%A, %d %B %Y, %H:%M:%S";
    match tz {
        TimeZone::Local => at.with_timezone(&Local).format(FMT).to_string(),
        TimeZone::Utc => at.format(FMT).to_string(),
        TimeZone::Named(tz) => at.with_timezone(&tz).format(FMT).to_string(),
    }
}

pub fn render(workbook: &Workbook, options: &ReportOptions) -> Result<RenderedReport, RenderError> {
    if options.row_cap == 0 { return Err(RenderError::Layout("row cap must be at least 1".into())); }
    if options.strict_encoding { check_encodable(workbook, options)?; }
    let logo = options.logo.as_deref().and_then(logo::load_logo);
    let geo = Geometry::a4(options.orientation);

    let mut flow = Flow::new(geo);
    flow.paragraph(&options.title, &TITLE);
    flow.space(4.0);
    flow.paragraph(&format!("Generated: {}", generated_stamp(options.generated_at, options.time_zone)), &NORMAL);
    flow.space(8.0);

    let mut truncated = Vec::new();
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        if i > 0 { flow.break_page(); }
        flow.keep_with_next(&HEADING, HEADING_FOLLOW);
        flow.paragraph(&format!("Sheet: {}", sheet.name), &HEADING);
        flow.space(4.0);
        if sheet.is_empty() {
            flow.paragraph(EMPTY_NOTICE, &NOTICE);
            continue;
        }
        let printed = sheet.rows().min(options.row_cap);
        let header: Vec<String> = sheet.column_names().into_iter().map(str::to_string).collect();
        let rows: Vec<Vec<String>> = (0..printed).map(|r| sheet.row_texts(r)).collect();
        flow.table(&header, &rows);
        if sheet.exceeds(options.row_cap) {
            log::info!("Sheet '{}' truncated to {} of {} rows", sheet.name, printed, sheet.rows());
            flow.space(4.0);
            flow.paragraph(&format!("Showing first {} of {} rows.", printed, sheet.rows()), &NOTICE);
            truncated.push(TruncatedSheet { sheet: sheet.name.clone(), total_rows: sheet.rows(), printed_rows: printed });
        }
    }

    let deco = Decorations { footer: &options.footer, logo: logo.as_ref().map(|l| Decorations::logo_size(l.height_for(1.0))) };
    let pages = layout::finalize(flow.into_pages(), &geo, &deco);
    let meta = pdf::PdfMeta { title: &options.title, created: options.generated_at };
    let bytes = pdf::write_pdf(&pages, &geo, logo.as_ref(), &meta, options.compress)?;
    log::info!("Rendered {} page(s), {} bytes", pages.len(), bytes.len());
    let logo_drawn = pages.last().is_some_and(layout::Page::has_logo);
    Ok(RenderedReport { bytes, page_count: pages.len(), truncated, logo_drawn })
}

fn check_encodable(workbook: &Workbook, options: &ReportOptions) -> Result<(), RenderError> {
    let fail = |sheet: &str, ch: char| RenderError::Unencodable { sheet: sheet.to_string(), ch };
    for text in [&options.title, &options.footer] {
        if let Some(ch) = metrics::first_unencodable(text) { return Err(fail("(title or footer)", ch)); }
    }
    for sheet in &workbook.sheets {
        let cells = sheet.column_names().into_iter().map(str::to_string)
            .chain((0..sheet.rows().min(options.row_cap)).flat_map(|r| sheet.row_texts(r)));
        for text in std::iter::once(sheet.name.clone()).chain(cells) {
            if let Some(ch) = metrics::first_unencodable(&text) { return Err(fail(&sheet.name, ch)); }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests_report {
    use super::*;
    use crate::fixtures::{long_sheet, workbook, Fx};
    use crate::report::logo::encode_test_png;
    use chrono::TimeZone as _;
    use lopdf::content::Content;
    use lopdf::{Document, Object};

    fn options() -> ReportOptions {
        ReportOptions {
            logo: None,
            generated_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
            time_zone: TimeZone::Utc,
            ..ReportOptions::default()
        }
    }

    struct Parsed {
        texts: Vec<Vec<String>>,
        logos: Vec<bool>,
    }

    fn parse(bytes: &[u8]) -> Parsed {
        let doc = Document::load_mem(bytes).unwrap();
        let mut texts: Vec<Vec<String>> = vec![];
        let mut logos = vec![];
        for (_, id) in doc.get_pages() {
            let ops = Content::decode(&doc.get_page_content(id).unwrap()).unwrap().operations;
            texts.push(ops.iter().filter(|o| o.operator == "Tj").filter_map(|o| match o.operands.first() {
                Some(Object::String(b, _)) => Some(b.iter().map(|&c| c as char).collect::<String>()),
                _ => None,
            }).collect());
            logos.push(ops.iter().any(|o| o.operator == "Do"));
        }
        Parsed { texts, logos }
    }

    #[test]
    fn stamp_format() {
        assert_eq!(generated_stamp(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(), TimeZone::Utc), "Tuesday, 05 March 2024, 14:07:09");
        let london = TimeZone::Named(chrono_tz::Europe::London);
        assert_eq!(generated_stamp(Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(), london), "Tuesday, 05 March 2024, 14:07:09");
        assert_eq!(generated_stamp(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap(), london), "Monday, 01 July 2024, 13:00:00");
    }

    #[test]
    fn header_only_sheet_renders_empty_notice() {
        let wb = workbook(&[("Results", vec![vec![Fx::S("Analyte"), Fx::S("Result")]])]);
        let report = render(&wb, &options()).unwrap();
        let parsed = parse(&report.bytes);
        assert_eq!(report.page_count, 1);
        let page = &parsed.texts[0];
        assert!(page.iter().any(|t| t == "Sheet: Results"));
        assert!(page.iter().any(|t| t == EMPTY_NOTICE));
        assert!(!page.iter().any(|t| t == "Analyte"));
        assert!(!report.is_truncated());
    }

    #[test]
    fn long_sheet_is_capped_with_repeating_header() {
        let wb = workbook(&[long_sheet("Nitrates", 1000)]);
        let report = render(&wb, &options()).unwrap();
        assert_eq!(report.truncated, vec![TruncatedSheet { sheet: "Nitrates".into(), total_rows: 1000, printed_rows: 60 }]);
        let parsed = parse(&report.bytes);
        let rows: usize = parsed.texts.iter().map(|p| p.iter().filter(|t| *t == "Nitrate").count()).sum();
        assert_eq!(rows, 60);
        let table_pages: Vec<&Vec<String>> = parsed.texts.iter().filter(|p| p.iter().any(|t| t == "Nitrate")).collect();
        assert!(table_pages.len() >= 2);
        assert!(table_pages.iter().all(|p| p.iter().any(|t| t == "Analyte")));
        let all: Vec<&String> = parsed.texts.iter().flatten().collect();
        assert!(all.iter().any(|t| *t == "Showing first 60 of 1000 rows."));
        assert!(all.iter().any(|t| *t == "60") && !all.iter().any(|t| *t == "61"));
    }

    #[test]
    fn footer_on_every_page_and_logo_on_last_only() {
        let dir = tempfile::tempdir().unwrap();
        let logo_path = dir.path().join("wordmark.png");
        std::fs::write(&logo_path, encode_test_png(40, 10, true)).unwrap();
        let wb = workbook(&[
            ("One", vec![vec![Fx::S("A")], vec![Fx::N(1.0)]]),
            ("Two", vec![vec![Fx::S("B")], vec![Fx::N(2.0)]]),
            ("Three", vec![vec![Fx::S("C")]]),
        ]);
        let report = render(&wb, &ReportOptions { logo: Some(logo_path), ..options() }).unwrap();
        assert_eq!(report.page_count, 3);
        assert!(report.logo_drawn);
        let parsed = parse(&report.bytes);
        assert_eq!(parsed.texts.len(), 3);
        assert!(parsed.texts.iter().all(|p| p.iter().any(|t| t == DEFAULT_FOOTER)));
        assert_eq!(parsed.logos, vec![false, false, true]);
    }

    #[test]
    fn missing_logo_still_renders_footer() {
        let wb = workbook(&[("One", vec![vec![Fx::S("A")], vec![Fx::N(1.0)]]), ("Two", vec![vec![Fx::S("B")]])]);
        let report = render(&wb, &ReportOptions { logo: Some(PathBuf::from("/nonexistent/logo.png")), ..options() }).unwrap();
        assert!(!report.logo_drawn);
        let parsed = parse(&report.bytes);
        assert_eq!(parsed.texts.len(), 2);
        assert!(parsed.texts.iter().all(|p| p.iter().any(|t| t == DEFAULT_FOOTER)));
        assert!(parsed.logos.iter().all(|l| !l));
    }

    #[test]
    fn sheets_start_on_their_own_pages() {
        let wb = workbook(&[("First", vec![vec![Fx::S("A")]]), ("Second", vec![vec![Fx::S("B")]])]);
        let parsed = parse(&render(&wb, &options()).unwrap().bytes);
        assert_eq!(parsed.texts.len(), 2);
        assert!(parsed.texts[0].iter().any(|t| t == DEFAULT_TITLE));
        assert!(parsed.texts[0].iter().any(|t| t == "Sheet: First"));
        assert!(parsed.texts[1].iter().any(|t| t == "Sheet: Second"));
    }

    #[test]
    fn rendering_is_deterministic_for_a_fixed_timestamp() {
        let wb = workbook(&[long_sheet("Data", 30)]);
        let a = render(&wb, &options()).unwrap();
        let b = render(&wb, &options()).unwrap();
        assert_eq!(a.bytes, b.bytes);
        let later = ReportOptions { generated_at: Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap(), ..options() };
        assert_ne!(render(&wb, &later).unwrap().bytes, a.bytes);
    }

    #[test]
    fn unencodable_text_is_replaced_or_rejected() {
        let wb = workbook(&[("Gas", vec![vec![Fx::S("Species")], vec![Fx::S("CO₂")]])]);
        let lossy = render(&wb, &options()).unwrap();
        assert!(parse(&lossy.bytes).texts[0].iter().any(|t| t == "CO?"));
        let err = render(&wb, &ReportOptions { strict_encoding: true, ..options() }).unwrap_err();
        assert!(matches!(err, RenderError::Unencodable { ref sheet, ch: '₂' } if sheet == "Gas"));
    }

    #[test]
    fn zero_row_cap_is_a_layout_error() {
        let wb = workbook(&[long_sheet("Data", 3)]);
        assert!(matches!(render(&wb, &ReportOptions { row_cap: 0, ..options() }), Err(RenderError::Layout(_))));
    }
}
