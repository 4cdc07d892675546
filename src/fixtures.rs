//! In-memory spreadsheet builders shared by unit tests.

use rust_xlsxwriter::Workbook as XlsxWorkbook;

use crate::workbook::{parse_workbook, IngestOptions, Workbook};

pub enum Fx {
    S(&'static str),
    N(f64),
    B(bool),
    Blank,
}

pub fn xlsx_bytes(sheets: &[(&str, Vec<Vec<Fx>>)]) -> Vec<u8> {
    let mut book = XlsxWorkbook::new();
    for (name, rows) in sheets {
        let ws = book.add_worksheet();
        ws.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Fx::S(s) => { ws.write_string(r, c, *s).unwrap(); }
                    Fx::N(n) => { ws.write_number(r, c, *n).unwrap(); }
                    Fx::B(b) => { ws.write_boolean(r, c, *b).unwrap(); }
                    Fx::Blank => {}
                }
            }
        }
    }
    book.save_to_buffer().unwrap()
}

pub fn workbook(sheets: &[(&str, Vec<Vec<Fx>>)]) -> Workbook {
    parse_workbook("fixture.xlsx", &xlsx_bytes(sheets), &IngestOptions::default()).unwrap()
}

/// A sheet with a header row and `rows` numbered data rows.
pub fn long_sheet(name: &'static str, rows: usize) -> (&'static str, Vec<Vec<Fx>>) {
    let mut out = vec![vec![Fx::S("Row"), Fx::S("Analyte"), Fx::S("Result")]];
    for i in 0..rows {
        out.push(vec![Fx::N(i as f64 + 1.0), Fx::S("Nitrate"), Fx::N(0.5 + i as f64)]);
    }
    (name, out)
}
