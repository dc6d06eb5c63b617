//! Source image decoding and SVG rasterization.
//!
//! Everything here is CPU-bound and runs on the blocking pool.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use postrelay_shared::RenderError;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};

/// JPEG quality of the emitted creative.
pub const JPEG_QUALITY: u8 = 95;

/// Mime type of an image body, when the bytes are a known image format.
pub fn image_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type())
}

/// Decode a downloaded image and re-encode it as a PNG `data:` URI that the
/// rasterizer can always read.
pub fn embed_as_data_uri(url: &str, bytes: &[u8]) -> Result<String, RenderError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| RenderError::Encode(format!("cannot decode {url}: {e}")))?;

    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| RenderError::Encode(format!("cannot re-encode {url}: {e}")))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}

/// Load the fonts available for title and footer text.
pub fn system_fonts() -> Arc<fontdb::Database> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
}

/// Rasterize `svg` onto a `width`×`height` canvas and encode it as JPEG.
pub fn rasterize_jpeg(
    svg: &str,
    width: u32,
    height: u32,
    fonts: Arc<fontdb::Database>,
) -> Result<Vec<u8>, RenderError> {
    let options = usvg::Options {
        fontdb: fonts,
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(svg, &options)
        .map_err(|e| RenderError::Encode(format!("invalid creative SVG: {e}")))?;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Encode(format!("cannot allocate {width}x{height} canvas")))?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    // the background rect is opaque, so premultiplied RGBA equals straight RGB
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Encode(format!("JPEG encoding failed: {e}")))?;

    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn detects_formats_by_content() {
        assert_eq!(image_mime(&encoded(ImageFormat::Png)), Some("image/png"));
        assert_eq!(image_mime(&encoded(ImageFormat::Jpeg)), Some("image/jpeg"));
        assert_eq!(image_mime(&encoded(ImageFormat::Bmp)), Some("image/bmp"));
        assert_eq!(image_mime(b"<html>login</html>"), None);
        assert_eq!(image_mime(b"%PDF-1.7"), None);
    }

    #[test]
    fn embedded_images_are_png() {
        let uri = embed_as_data_uri("https://x/a.bmp", &encoded(ImageFormat::Bmp)).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn truncated_image_is_encode_error() {
        let err = embed_as_data_uri("https://x/a.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10])
            .unwrap_err();
        assert!(matches!(err, RenderError::Encode(msg) if msg.contains("https://x/a.jpg")));
    }

    #[test]
    fn rasterizes_to_jpeg_of_canvas_size() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20" viewBox="0 0 40 20"><rect width="40" height="20" fill="#0000ff"/></svg>"##;
        let jpeg = rasterize_jpeg(svg, 40, 20, Arc::new(fontdb::Database::new())).unwrap();

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (40, 20));
        let px = decoded.get_pixel(20, 10);
        assert!(px[2] > 200 && px[0] < 40, "expected blue, got {px:?}");
    }

    #[test]
    fn invalid_svg_is_encode_error() {
        let err = rasterize_jpeg("not svg", 10, 10, Arc::new(fontdb::Database::new()))
            .unwrap_err();
        assert!(matches!(err, RenderError::Encode(_)));
    }
}
