use std::io::Cursor;
use std::path::Path;

use png::{BitDepth, ColorType};

const MAX_LOGO_PIXELS: usize = 16 * 1024 * 1024;

/// Decoded logo: 8-bit RGB samples plus an optional 8-bit alpha plane.
#[derive(Clone, Debug)]
pub struct LogoImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl LogoImage {
    /// Height for a given drawn width, keeping the aspect ratio.
    pub fn height_for(&self, width: f32) -> f32 { width * self.height as f32 / self.width as f32 }
}

/// A missing or undecodable logo is logged and skipped.
pub fn load_logo(path: &Path) -> Option<LogoImage> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => { log::warn!("Logo {} not available: {}", path.to_string_lossy(), e); return None }
    };
    match decode_png(&bytes) {
        Ok(img) => Some(img),
        Err(e) => { log::warn!("Logo {} could not be decoded: {}", path.to_string_lossy(), e); None }
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<LogoImage, String> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|e| format!("png header: {e}"))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(|e| format!("png frame: {e}"))?;
    let data = &buf[..info.buffer_size()];
    let (width, height) = (info.width, info.height);
    if width == 0 || height == 0 { return Err("png has zero width or height".into()); }
    let pixels = (width as usize).checked_mul(height as usize).filter(|p| *p <= MAX_LOGO_PIXELS).ok_or("png too large")?;
    if info.bit_depth != BitDepth::Eight { return Err(format!("unsupported bit depth {:?}", info.bit_depth)); }

    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::new();
    match info.color_type {
        ColorType::Rgb => rgb.extend_from_slice(data),
        ColorType::Rgba => for px in data.chunks_exact(4) { rgb.extend_from_slice(&px[..3]); alpha.push(px[3]); },
        ColorType::Grayscale => for &g in data { rgb.extend_from_slice(&[g, g, g]); },
        ColorType::GrayscaleAlpha => for px in data.chunks_exact(2) { rgb.extend_from_slice(&[px[0], px[0], px[0]]); alpha.push(px[1]); },
        ColorType::Indexed => return Err("indexed png was not expanded".into()),
    }
    if rgb.len() != pixels * 3 { return Err("png sample count does not match its dimensions".into()); }
    let alpha = if alpha.is_empty() || alpha.iter().all(|a| *a == 255) { None } else { Some(alpha) };
    Ok(LogoImage { width, height, rgb, alpha })
}

#[cfg(test)]
pub(crate) fn encode_test_png(width: u32, height: u32, with_alpha: bool) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut enc = png::Encoder::new(&mut out, width, height);
        enc.set_color(if with_alpha { ColorType::Rgba } else { ColorType::Rgb });
        enc.set_depth(BitDepth::Eight);
        let mut writer = enc.write_header().unwrap();
        let channels = if with_alpha { 4 } else { 3 };
        let data: Vec<u8> = (0..width * height * channels).map(|i| if with_alpha && i % 4 == 3 { (i % 200) as u8 } else { 0x2F }).collect();
        writer.write_image_data(&data).unwrap();
    }
    out
}

#[cfg(test)]
mod tests_logo {
    use super::*;

    #[test]
    fn rgb_png_has_no_alpha() {
        let img = decode_png(&encode_test_png(4, 2, false)).unwrap();
        assert_eq!((img.width, img.height), (4, 2));
        assert_eq!(img.rgb.len(), 24);
        assert!(img.alpha.is_none());
        assert!((img.height_for(60.0) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn rgba_png_splits_alpha() {
        let img = decode_png(&encode_test_png(3, 3, true)).unwrap();
        assert_eq!(img.rgb.len(), 27);
        assert_eq!(img.alpha.as_ref().map(Vec::len), Some(9));
    }

    #[test]
    fn missing_or_corrupt_logo_is_none() {
        assert!(load_logo(Path::new("/nonexistent/assets/logo.png")).is_none());
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("logo.png");
        std::fs::write(&p, b"not a png").unwrap();
        assert!(load_logo(&p).is_none());
    }
}
