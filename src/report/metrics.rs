//! Base-14 Helvetica metrics and WinAnsi encoding.
//!
//! Widths are the AFM advance widths in thousandths of an em for printable ASCII.
//! Anything else measures as a digit, which overestimates slightly.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    pub const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];

    pub fn resource(self) -> &'static str {
        match self { Font::Regular => "F1", Font::Bold => "F2", Font::Oblique => "F3" }
    }

    pub fn base_name(self) -> &'static str {
        match self { Font::Regular => "Helvetica", Font::Bold => "Helvetica-Bold", Font::Oblique => "Helvetica-Oblique" }
    }
}

const DEFAULT_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

pub fn char_width(font: Font, c: char) -> u16 {
    let table = match font { Font::Bold => &HELVETICA_BOLD, Font::Regular | Font::Oblique => &HELVETICA };
    let code = c as u32;
    if (32..127).contains(&code) { table[(code - 32) as usize] } else { DEFAULT_WIDTH }
}

/// Advance width of `text` in points.
pub fn text_width(font: Font, size: f32, text: &str) -> f32 {
    text.chars().map(|c| char_width(font, c) as f32).sum::<f32>() * size / 1000.0
}

/// WinAnsiEncoding byte for `c`, if the encoding has one.
pub fn winansi(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => Some(match c {
            '€' => 0x80, '‚' => 0x82, 'ƒ' => 0x83, '„' => 0x84, '…' => 0x85, '†' => 0x86, '‡' => 0x87,
            'ˆ' => 0x88, '‰' => 0x89, 'Š' => 0x8A, '‹' => 0x8B, 'Œ' => 0x8C, 'Ž' => 0x8E,
            '‘' => 0x91, '’' => 0x92, '“' => 0x93, '”' => 0x94, '•' => 0x95, '–' => 0x96, '—' => 0x97,
            '˜' => 0x98, '™' => 0x99, 'š' => 0x9A, '›' => 0x9B, 'œ' => 0x9C, 'ž' => 0x9E, 'Ÿ' => 0x9F,
            _ => return None,
        }),
    }
}

/// First character of `text` that WinAnsi cannot represent. Tabs and newlines are laid out as spaces.
pub fn first_unencodable(text: &str) -> Option<char> {
    text.chars().find(|&c| !matches!(c, '\t' | '\n' | '\r') && winansi(c).is_none())
}

/// Encodes `text`, substituting `?` for unrepresentable characters. Returns the bytes and the substitution count.
pub fn encode_lossy(text: &str) -> (Vec<u8>, usize) {
    let mut replaced = 0;
    let bytes = text.chars().map(|c| match c {
        '\t' | '\n' | '\r' => b' ',
        _ => winansi(c).unwrap_or_else(|| { replaced += 1; b'?' }),
    }).collect();
    (bytes, replaced)
}
