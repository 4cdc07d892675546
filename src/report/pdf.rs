use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use super::layout::{Geometry, Mark, Page, Rgb};
use super::logo::LogoImage;
use super::metrics::{encode_lossy, Font};
use super::RenderError;

pub const LOGO_RESOURCE: &str = "Logo";
const PRODUCER: &str = concat!("cdrdash ", env!("CARGO_PKG_VERSION"));

pub struct PdfMeta<'a> {
    pub title: &'a str,
    pub created: DateTime<Utc>,
}

/// Serialises finished pages. Nothing is returned unless the whole document was written.
pub fn write_pdf(pages: &[Page], geo: &Geometry, logo: Option<&LogoImage>, meta: &PdfMeta, compress: bool) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), id);
    }
    let mut resources = dictionary! { "Font" => fonts };
    if let Some(img) = logo {
        let image_id = add_image(&mut doc, img);
        resources.set("XObject", dictionary! { LOGO_RESOURCE => image_id });
    }
    let resources_id = doc.add_object(resources);

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    let mut replaced = 0;
    for page in pages {
        let operations: Vec<Operation> = page.marks.iter().flat_map(|m| mark_operations(m, &mut replaced)).collect();
        let content = Content { operations }.encode().map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), num(geo.width), num(geo.height)],
        });
        kids.push(page_id.into());
    }
    if replaced > 0 { log::warn!("{} character(s) not representable in the report font were replaced by '?'", replaced); }

    doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages.len() as i64,
        "Resources" => resources_id,
    }));
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(encode_lossy(meta.title).0, StringFormat::Literal),
        "Producer" => Object::string_literal(PRODUCER),
        "CreationDate" => Object::string_literal(meta.created.format("D:%Y%m%d%H%M%SZ").to_string()),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    if compress { doc.compress(); }
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| RenderError::Write(e.to_string()))?;
    Ok(out)
}

fn add_image(doc: &mut Document, img: &LogoImage) -> lopdf::ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8i64,
    };
    if let Some(alpha) = &img.alpha {
        let mask_id = doc.add_object(Stream::new(dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => img.width as i64,
            "Height" => img.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
        }, alpha.clone()));
        dict.set("SMask", mask_id);
    }
    doc.add_object(Stream::new(dict, img.rgb.clone()))
}

fn num(v: f32) -> Object { ((v * 100.0).round() / 100.0).into() }

fn color(c: Rgb) -> Vec<Object> { vec![num(c.0), num(c.1), num(c.2)] }

fn mark_operations(mark: &Mark, replaced: &mut usize) -> Vec<Operation> {
    match mark {
        Mark::Text { x, y, font, size, color: c, text } => {
            let (bytes, n) = encode_lossy(text);
            *replaced += n;
            vec![
                Operation::new("BT", vec![]),
                Operation::new("rg", color(*c)),
                Operation::new("Tf", vec![Object::Name(font.resource().as_bytes().to_vec()), num(*size)]),
                Operation::new("Td", vec![num(*x), num(*y)]),
                Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]),
                Operation::new("ET", vec![]),
            ]
        }
        Mark::Fill { x, y, w, h, color: c } => vec![
            Operation::new("q", vec![]),
            Operation::new("rg", color(*c)),
            Operation::new("re", vec![num(*x), num(*y), num(*w), num(*h)]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ],
        Mark::Stroke { x, y, w, h, color: c, width } => vec![
            Operation::new("q", vec![]),
            Operation::new("RG", color(*c)),
            Operation::new("w", vec![num(*width)]),
            Operation::new("re", vec![num(*x), num(*y), num(*w), num(*h)]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ],
        Mark::Logo { x, y, w, h } => vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![num(*w), 0i64.into(), 0i64.into(), num(*h), num(*x), num(*y)]),
            Operation::new("Do", vec![Object::Name(LOGO_RESOURCE.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    }
}

#[cfg(test)]
mod tests_pdf {
    use super::*;
    use crate::report::layout::BLACK;
    use crate::report::Orientation;
    use chrono::TimeZone;

    #[test]
    fn written_document_reloads_with_same_pages() {
        let geo = Geometry::a4(Orientation::Portrait);
        let text = |s: &str| Mark::Text { x: 10.0, y: 700.0, font: Font::Regular, size: 10.0, color: BLACK, text: s.into() };
        let pages = vec![Page { marks: vec![text("first (page)")] }, Page { marks: vec![text("second")] }];
        let meta = PdfMeta { title: "Check", created: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() };
        let bytes = write_pdf(&pages, &geo, None, &meta, true).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        let ids: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(ids.len(), 2);
        let ops = Content::decode(&doc.get_page_content(ids[0]).unwrap()).unwrap().operations;
        let shown: Vec<Vec<u8>> = ops.iter().filter(|o| o.operator == "Tj").filter_map(|o| match o.operands.first() { Some(Object::String(b, _)) => Some(b.clone()), _ => None }).collect();
        assert_eq!(shown, vec![b"first (page)".to_vec()]);
    }

    #[test]
    fn logo_resource_is_registered_with_soft_mask() {
        let geo = Geometry::a4(Orientation::Portrait);
        let img = LogoImage { width: 2, height: 1, rgb: vec![0; 6], alpha: Some(vec![0, 128]) };
        let pages = vec![Page { marks: vec![Mark::Logo { x: 34.0, y: 34.0, w: 170.0, h: 85.0 }] }];
        let meta = PdfMeta { title: "Logo", created: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() };
        let bytes = write_pdf(&pages, &geo, Some(&img), &meta, false).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let images = doc.objects.values().filter(|o| matches!(o, Object::Stream(s) if s.dict.get(b"Subtype").ok().and_then(|v| v.as_name().ok()) == Some(b"Image".as_slice()))).count();
        assert_eq!(images, 2);
    }
}
