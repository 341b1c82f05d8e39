use crate::error::RenameError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertTarget {
    Jpeg,
    Webp,
}

impl ConvertTarget {
    pub fn extension(self) -> &'static str {
        match self {
            ConvertTarget::Jpeg => "jpeg",
            ConvertTarget::Webp => "webp",
        }
    }
}

pub const DEFAULT_QUALITY: f32 = 0.8;
pub const MIN_QUALITY: f32 = 0.1;

/// 文字列の品質値を 0.1〜1.0 に丸める。読めない値は既定値。
pub fn parse_quality(value: &str) -> f32 {
    match value.trim().parse::<f32>() {
        Ok(q) if q.is_finite() => q.clamp(MIN_QUALITY, 1.0),
        _ => DEFAULT_QUALITY,
    }
}

/// 画像を白背景に合成してから `target` 形式で再エンコードする。
///
/// WebP は可逆エンコードのため `quality` は JPEG にだけ効く。
pub fn convert(bytes: &[u8], quality: f32, target: ConvertTarget) -> Result<Vec<u8>, RenameError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| RenameError::Conversion(format!("デコードできませんでした: {err}")))?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(RenameError::Conversion("画像サイズが 0 です".to_string()));
    }

    let flattened = flatten_on_white(&decoded.to_rgba8());
    let mut buf = Vec::new();
    let encoded = match target {
        ConvertTarget::Jpeg => JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality))
            .write_image(flattened.as_raw(), width, height, ExtendedColorType::Rgb8),
        ConvertTarget::Webp => WebPEncoder::new_lossless(&mut buf).write_image(
            flattened.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
    };
    encoded.map_err(|err| RenameError::Conversion(format!("エンコードできませんでした: {err}")))?;

    debug!(
        width,
        height,
        format = target.extension(),
        before = bytes.len(),
        after = buf.len(),
        "画像を変換しました"
    );
    Ok(buf)
}

pub fn is_png(bytes: &[u8]) -> bool {
    matches!(image::guess_format(bytes), Ok(ImageFormat::Png))
}

fn flatten_on_white(source: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(source.width(), source.height(), |x, y| {
        let [r, g, b, a] = source.get_pixel(x, y).0;
        image::Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
    })
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(MIN_QUALITY, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};
    use std::io::Cursor;

    fn png_bytes(image: RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    fn opaque_png() -> Vec<u8> {
        png_bytes(RgbaImage::from_pixel(7, 3, Rgba([10, 120, 200, 255])))
    }

    #[test]
    fn jpeg_roundtrip_keeps_dimensions() {
        let out = convert(&opaque_png(), 1.0, ConvertTarget::Jpeg).expect("convert to jpeg");
        assert_eq!(image::guess_format(&out).expect("format"), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&out).expect("decode jpeg");
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
    }

    #[test]
    fn webp_roundtrip_keeps_dimensions() {
        let out = convert(&opaque_png(), 1.0, ConvertTarget::Webp).expect("convert to webp");
        assert_eq!(image::guess_format(&out).expect("format"), ImageFormat::WebP);
        let decoded = image::load_from_memory(&out).expect("decode webp");
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut source = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        source.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let out = convert(&png_bytes(source), 1.0, ConvertTarget::Webp).expect("convert");
        let decoded = image::load_from_memory(&out).expect("decode").to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn corrupt_input_is_a_conversion_error() {
        let err = convert(b"definitely not an image", 0.8, ConvertTarget::Jpeg)
            .expect_err("must fail");
        assert!(matches!(err, RenameError::Conversion(_)));
    }

    #[test]
    fn half_alpha_blends_toward_white() {
        assert_eq!(over_white(0, 255), 0);
        assert_eq!(over_white(0, 0), 255);
        assert_eq!(over_white(0, 128), 127);
        assert_eq!(over_white(200, 128), 227);
    }

    #[test]
    fn quality_is_parsed_and_clamped() {
        assert_eq!(parse_quality("0.5"), 0.5);
        assert_eq!(parse_quality(" 1 "), 1.0);
        assert_eq!(parse_quality("3"), 1.0);
        assert_eq!(parse_quality("0"), MIN_QUALITY);
        assert_eq!(parse_quality("abc"), DEFAULT_QUALITY);
        assert_eq!(parse_quality("NaN"), DEFAULT_QUALITY);
        assert_eq!(jpeg_quality(0.8), 80);
    }

    #[test]
    fn detects_png_signature() {
        assert!(is_png(&opaque_png()));
        assert!(!is_png(b"GIF89a"));
    }
}
