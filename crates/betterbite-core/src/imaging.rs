//! Image encodings shared by camera capture, file import and upload
//!
//! Every image travels through the app as a JPEG data URI
//! (`data:image/jpeg;base64,...`), whatever its source.

use std::io::Cursor;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use regex::Regex;

pub const JPEG_MIME: &str = "image/jpeg";
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Longest edge kept before encoding; larger images are downscaled
pub const MAX_EDGE: u32 = 1600;

fn data_uri_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^data:[A-Za-z0-9.+/-]*(?:;[^,;]+)*,").expect("static regex")
    })
}

/// Strip a `data:<mime>;base64,` transport prefix, returning the raw payload
pub fn strip_transport_prefix(encoded: &str) -> &str {
    match data_uri_header().find(encoded) {
        Some(header) => &encoded[header.end()..],
        None => encoded,
    }
}

/// Decode the payload of a data URI (or a bare base64 string) to bytes
pub fn data_uri_bytes(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(strip_transport_prefix(encoded).trim())
        .map_err(|e| anyhow!("Invalid base64 image payload: {}", e))
}

/// Encode an RGBA frame as a JPEG data URI
pub fn encode_frame(frame: RgbaImage, quality: u8) -> Result<String, image::ImageError> {
    encode_image(DynamicImage::ImageRgba8(frame), quality)
}

/// Decode arbitrary image bytes and re-encode them as a JPEG data URI
pub fn reencode_bytes(bytes: &[u8], quality: u8) -> Result<String, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    encode_image(img, quality)
}

fn encode_image(img: DynamicImage, quality: u8) -> Result<String, image::ImageError> {
    let img = if img.width().max(img.height()) > MAX_EDGE {
        img.resize(MAX_EDGE, MAX_EDGE, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&rgb)?;

    Ok(format!("data:{};base64,{}", JPEG_MIME, STANDARD.encode(buf.into_inner())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_transport_prefix("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_transport_prefix("data:image/png;name=x.png;base64,QQ=="), "QQ==");
        assert_eq!(strip_transport_prefix("AAAA"), "AAAA");
    }

    #[test]
    fn test_encode_frame_produces_jpeg() {
        let frame = RgbaImage::from_pixel(8, 6, Rgba([10, 200, 10, 255]));
        let uri = encode_frame(frame, DEFAULT_JPEG_QUALITY).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let bytes = data_uri_bytes(&uri).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_large_frames_are_downscaled() {
        let frame = RgbaImage::from_pixel(3200, 800, Rgba([0, 0, 0, 255]));
        let uri = encode_frame(frame, 50).unwrap();
        let decoded = image::load_from_memory(&data_uri_bytes(&uri).unwrap()).unwrap();
        assert_eq!(decoded.width(), MAX_EDGE);
        assert_eq!(decoded.height(), 400);
    }

    #[test]
    fn test_reencode_rejects_garbage() {
        assert!(reencode_bytes(b"definitely not an image", 80).is_err());
    }
}
