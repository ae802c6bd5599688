use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Matches the default quality of common imaging libraries.
pub const JPEG_QUALITY: u8 = 75;

/// Encodes an image as baseline JPEG. Any alpha channel is dropped.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .context("failed to encode image as JPEG")?;
    Ok(bytes)
}

pub fn image_to_jpeg_data_url(img: &DynamicImage) -> Result<String> {
    let bytes = encode_jpeg(img)?;
    Ok(format!("{JPEG_DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(32, 24, |x, y| {
            image::Rgb([(x * 8) as u8, (y * 10) as u8, 128])
        }))
    }

    #[test]
    fn jpeg_has_magic_bytes() {
        let bytes = encode_jpeg(&gradient()).unwrap();
        assert!(bytes.len() > 3);
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn alpha_is_dropped() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 40])));
        let bytes = encode_jpeg(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn data_url_payload_is_standard_base64_jpeg() {
        let url = image_to_jpeg_data_url(&gradient()).unwrap();
        let payload = url.strip_prefix(JPEG_DATA_URL_PREFIX).unwrap();
        assert!(!payload.is_empty());
        assert!(payload
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
