//! Page layout. Blocks flow top-down into pages; footer and logo are stamped
//! afterwards once the page count is final.

use super::metrics::{text_width, Font};
use super::Orientation;

pub const MM: f32 = 72.0 / 25.4;

const A4_SHORT: f32 = 595.28;
const A4_LONG: f32 = 841.89;

const TABLE_SIZE: f32 = 8.0;
const TABLE_LEADING: f32 = 9.6;
const HPAD: f32 = 4.0;
const VPAD: f32 = 2.0;
const GRID_WIDTH: f32 = 0.25;
const MIN_COLUMN: f32 = 24.0;

const FOOTER_SIZE: f32 = 7.0;
const LOGO_WIDTH: f32 = 60.0 * MM;
/// Gap kept between the lowest body content and the top of the logo.
const LOGO_CLEARANCE: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const fn hex(v: u32) -> Rgb {
        Rgb(((v >> 16) & 0xFF) as f32 / 255.0, ((v >> 8) & 0xFF) as f32 / 255.0, (v & 0xFF) as f32 / 255.0)
    }
}

pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);
pub const HEADER_BG: Rgb = Rgb::hex(0x2F3B52);
pub const ROW_EVEN: Rgb = Rgb::hex(0xF5F5F5);
pub const ROW_ODD: Rgb = Rgb::hex(0xF7F9FC);
pub const GRID: Rgb = Rgb::hex(0xD3DAE6);

/// Drawing primitive in PDF user space (origin bottom-left, points).
#[derive(Clone, Debug, PartialEq)]
pub enum Mark {
    Text { x: f32, y: f32, font: Font, size: f32, color: Rgb, text: String },
    Fill { x: f32, y: f32, w: f32, h: f32, color: Rgb },
    Stroke { x: f32, y: f32, w: f32, h: f32, color: Rgb, width: f32 },
    Logo { x: f32, y: f32, w: f32, h: f32 },
}

#[derive(Clone, Debug, Default)]
pub struct Page {
    pub marks: Vec<Mark>,
}

impl Page {
    #[cfg(test)]
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().filter_map(|m| match m { Mark::Text { text, .. } => Some(text.as_str()), _ => None })
    }

    pub fn has_logo(&self) -> bool { self.marks.iter().any(|m| matches!(m, Mark::Logo { .. })) }

    /// Lowest y reached by any mark, counting text descenders.
    fn content_floor(&self) -> Option<f32> {
        self.marks.iter().map(|m| match m {
            Mark::Text { y, size, .. } => y - size * 0.25,
            Mark::Fill { y, .. } | Mark::Stroke { y, .. } | Mark::Logo { y, .. } => *y,
        }).reduce(f32::min)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Geometry {
    pub fn a4(orientation: Orientation) -> Self {
        let (width, height) = match orientation { Orientation::Portrait => (A4_SHORT, A4_LONG), Orientation::Landscape => (A4_LONG, A4_SHORT) };
        Geometry { width, height, left: 12.0 * MM, right: 12.0 * MM, top: 10.0 * MM, bottom: 18.0 * MM }
    }

    pub fn frame_width(&self) -> f32 { self.width - self.left - self.right }

    fn frame_top(&self) -> f32 { self.height - self.top }

    fn frame_height(&self) -> f32 { self.frame_top() - self.bottom }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Clone, Copy, Debug)]
pub struct ParaStyle {
    pub font: Font,
    pub size: f32,
    pub leading: f32,
    pub space_before: f32,
    pub space_after: f32,
    pub align: Align,
}

pub const TITLE: ParaStyle = ParaStyle { font: Font::Bold, size: 18.0, leading: 22.0, space_before: 0.0, space_after: 6.0, align: Align::Center };
pub const NORMAL: ParaStyle = ParaStyle { font: Font::Regular, size: 10.0, leading: 12.0, space_before: 0.0, space_after: 0.0, align: Align::Left };
pub const NOTICE: ParaStyle = ParaStyle { font: Font::Oblique, ..NORMAL };
pub const HEADING: ParaStyle = ParaStyle { font: Font::Bold, size: 12.0, leading: 14.4, space_before: 12.0, space_after: 6.0, align: Align::Left };

/// Body content flowing into pages within the frame.
pub struct Flow {
    geo: Geometry,
    pages: Vec<Page>,
    cursor: f32,
}

impl Flow {
    pub fn new(geo: Geometry) -> Self { Flow { geo, pages: vec![Page::default()], cursor: geo.frame_top() } }

    fn page(&mut self) -> &mut Page {
        if self.pages.is_empty() { self.pages.push(Page::default()); }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn fresh(&self) -> bool { self.cursor >= self.geo.frame_top() }

    fn room(&self) -> f32 { self.cursor - self.geo.bottom }

    pub fn break_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = self.geo.frame_top();
    }

    /// Starts a new page unless `h` fits or the page is still empty.
    fn ensure(&mut self, h: f32) {
        if h > self.room() && !self.fresh() { self.break_page(); }
    }

    /// Vertical gap; swallowed at the top of a page and clamped at the bottom.
    pub fn space(&mut self, h: f32) {
        if self.fresh() { return; }
        self.cursor = (self.cursor - h).max(self.geo.bottom);
    }

    pub fn paragraph(&mut self, text: &str, style: &ParaStyle) {
        self.space(style.space_before);
        let width = self.geo.frame_width();
        for line in wrap(text, style.font, style.size, width) {
            self.ensure(style.leading);
            let x = match style.align {
                Align::Left => self.geo.left,
                Align::Center => self.geo.left + (width - text_width(style.font, style.size, &line)).max(0.0) / 2.0,
            };
            let y = self.cursor - style.size;
            self.page().marks.push(Mark::Text { x, y, font: style.font, size: style.size, color: BLACK, text: line });
            self.cursor -= style.leading;
        }
        self.space(style.space_after);
    }

    /// Breaks first if `heading` plus `follow` points of whatever comes next would not fit.
    pub fn keep_with_next(&mut self, style: &ParaStyle, follow: f32) {
        let need = style.space_before + style.leading + style.space_after + follow;
        if need > self.room() && !self.fresh() { self.break_page(); }
    }

    /// Grid table; the header row is redrawn at the top of every page the table reaches.
    pub fn table(&mut self, header: &[String], rows: &[Vec<String>]) {
        if header.is_empty() { return; }
        let widths = column_widths(header, rows, self.geo.frame_width());
        let total: f32 = widths.iter().sum();
        let x0 = self.geo.left + (self.geo.frame_width() - total).max(0.0) / 2.0;
        let head = wrap_row(header, &widths, Font::Bold);
        let head_h = row_height(&head);
        let body: Vec<Vec<Vec<String>>> = rows.iter().map(|r| wrap_row(r, &widths, Font::Regular)).collect();

        let first_h = body.first().map(|r| row_height(r)).unwrap_or(0.0);
        self.ensure(head_h + first_h.min(self.geo.frame_height() - head_h));
        self.draw_row(x0, &widths, &head, Font::Bold, HEADER_BG, WHITE, true);

        for (i, cells) in body.iter().enumerate() {
            let bg = if i % 2 == 0 { ROW_EVEN } else { ROW_ODD };
            let mut rest: Vec<&[String]> = cells.iter().map(|c| c.as_slice()).collect();
            loop {
                let lines = rest.iter().map(|c| c.len()).max().unwrap_or(1).max(1);
                let fit = ((self.room() - 2.0 * VPAD) / TABLE_LEADING).floor().max(0.0) as usize;
                if fit >= lines {
                    let chunk: Vec<Vec<String>> = rest.iter().map(|c| c.to_vec()).collect();
                    self.draw_row(x0, &widths, &chunk, Font::Regular, bg, BLACK, false);
                    break;
                }
                let header_only = self.cursor + head_h >= self.geo.frame_top() - 0.01;
                if header_only && fit == 0 {
                    log::warn!("Table header leaves no room for rows; content will overrun the bottom margin");
                    let chunk: Vec<Vec<String>> = rest.iter().map(|c| c.to_vec()).collect();
                    self.draw_row(x0, &widths, &chunk, Font::Regular, bg, BLACK, false);
                    break;
                }
                if header_only {
                    // Taller than a whole page: split the row's lines across pages.
                    let chunk: Vec<Vec<String>> = rest.iter().map(|c| c[..fit.min(c.len())].to_vec()).collect();
                    self.draw_row(x0, &widths, &chunk, Font::Regular, bg, BLACK, false);
                    rest = rest.into_iter().map(|c| &c[fit.min(c.len())..]).collect();
                }
                self.break_page();
                self.draw_row(x0, &widths, &head, Font::Bold, HEADER_BG, WHITE, true);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_row(&mut self, x0: f32, widths: &[f32], cells: &[Vec<String>], font: Font, bg: Rgb, fg: Rgb, centred: bool) {
        let h = row_height(cells);
        let top = self.cursor;
        let total: f32 = widths.iter().sum();
        let page = self.page();
        page.marks.push(Mark::Fill { x: x0, y: top - h, w: total, h, color: bg });
        let mut x = x0;
        for (w, lines) in widths.iter().zip(cells) {
            page.marks.push(Mark::Stroke { x, y: top - h, w: *w, h, color: GRID, width: GRID_WIDTH });
            for (n, line) in lines.iter().enumerate() {
                if line.is_empty() { continue; }
                let tx = if centred { x + (w - text_width(font, TABLE_SIZE, line)).max(0.0) / 2.0 } else { x + HPAD };
                let ty = top - VPAD - TABLE_SIZE - n as f32 * TABLE_LEADING;
                page.marks.push(Mark::Text { x: tx, y: ty, font, size: TABLE_SIZE, color: fg, text: line.clone() });
            }
            x += w;
        }
        self.cursor -= h;
    }

    pub fn into_pages(self) -> Vec<Page> { self.pages }
}

fn row_height(cells: &[Vec<String>]) -> f32 {
    let lines = cells.iter().map(|c| c.len()).max().unwrap_or(1).max(1);
    lines as f32 * TABLE_LEADING + 2.0 * VPAD
}

fn wrap_row(cells: &[String], widths: &[f32], font: Font) -> Vec<Vec<String>> {
    widths.iter().enumerate().map(|(i, w)| wrap(cells.get(i).map(String::as_str).unwrap_or(""), font, TABLE_SIZE, w - 2.0 * HPAD)).collect()
}

/// Natural widths when they fit; otherwise max-min fair shares of the frame.
fn column_widths(header: &[String], rows: &[Vec<String>], frame: f32) -> Vec<f32> {
    let natural: Vec<f32> = header.iter().enumerate().map(|(i, h)| {
        let head = widest_line(h, Font::Bold);
        let body = rows.iter().filter_map(|r| r.get(i)).map(|c| widest_line(c, Font::Regular)).fold(0.0, f32::max);
        head.max(body) + 2.0 * HPAD
    }).collect();
    if natural.iter().sum::<f32>() <= frame { return natural; }

    let mut order: Vec<usize> = (0..natural.len()).collect();
    order.sort_by(|a, b| natural[*a].total_cmp(&natural[*b]));
    let mut out = vec![0.0; natural.len()];
    let mut remaining = frame;
    for (k, &i) in order.iter().enumerate() {
        let share = remaining / (order.len() - k) as f32;
        out[i] = natural[i].min(share).max(MIN_COLUMN.min(share));
        remaining -= out[i];
    }
    out
}

fn widest_line(text: &str, font: Font) -> f32 { text.lines().map(|l| text_width(font, TABLE_SIZE, l)).fold(0.0, f32::max) }

/// Greedy word wrap; words wider than `width` are split by character. Always yields at least one line.
pub fn wrap(text: &str, font: Font, size: f32, width: f32) -> Vec<String> {
    let mut out = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        for word in para.split_whitespace() {
            let candidate = if line.is_empty() { word.to_string() } else { format!("{line} {word}") };
            if text_width(font, size, &candidate) <= width {
                line = candidate;
                continue;
            }
            if !line.is_empty() { out.push(std::mem::take(&mut line)); }
            for c in word.chars() {
                line.push(c);
                if text_width(font, size, &line) > width && line.chars().count() > 1 {
                    line.pop();
                    out.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        out.push(line);
    }
    out
}

/// What to stamp on finished pages.
pub struct Decorations<'a> {
    pub footer: &'a str,
    /// Drawn logo size in points.
    pub logo: Option<(f32, f32)>,
}

impl Decorations<'_> {
    pub fn logo_size(aspect: f32) -> (f32, f32) { (LOGO_WIDTH, LOGO_WIDTH * aspect) }
}

/// Second pass: the page count is final here, so the last page is known for certain.
pub fn finalize(mut pages: Vec<Page>, geo: &Geometry, deco: &Decorations) -> Vec<Page> {
    if pages.is_empty() { pages.push(Page::default()); }
    let base = 8.0 * MM;
    if let Some((_, h)) = deco.logo {
        let band_top = base + 12.0 + h + LOGO_CLEARANCE;
        let collides = pages.last().and_then(Page::content_floor).is_some_and(|floor| floor < band_top);
        if collides {
            log::debug!("Last page content reaches the logo band, adding a closing page");
            pages.push(Page::default());
        }
    }
    let n = pages.len();
    for (i, page) in pages.iter_mut().enumerate() {
        page.marks.push(Mark::Text { x: geo.left, y: base + 5.0, font: Font::Regular, size: FOOTER_SIZE, color: BLACK, text: deco.footer.to_string() });
        if i + 1 == n && let Some((w, h)) = deco.logo {
            page.marks.push(Mark::Logo { x: geo.left, y: base + 12.0, w, h });
        }
    }
    pages
}
