//! Snapshot codec.
//!
//! A snapshot is the whole surface encoded as a PNG data URL. The empty
//! string is reserved as the "clear the surface" sentinel.

use crate::surface::{RasterImage, RasterSurface};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix of every snapshot produced by [`encode`].
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Snapshot is the clear sentinel and carries no image")]
    ClearSentinel,
    #[error("Not a base64 data URL")]
    NotDataUrl,
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("PNG decoding failed: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("Unsupported PNG color type: {0:?}")]
    UnsupportedColor(png::ColorType),
}

/// Full serialized image of the drawing surface at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    /// The clear sentinel.
    pub fn clear() -> Self {
        Self(String::new())
    }

    /// Wrap a data URL received from the relay or from storage.
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    /// Check whether this is the clear sentinel.
    pub fn is_clear(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Snapshot {
    fn from(data_url: String) -> Self {
        Self(data_url)
    }
}

/// Encode the current surface contents as a snapshot.
pub fn encode<S: RasterSurface + ?Sized>(surface: &S) -> Result<Snapshot, CodecError> {
    let png = encode_png(surface.width(), surface.height(), surface.pixels())?;
    Ok(from_png_bytes(&png))
}

/// Decode a snapshot back into pixels.
pub fn decode(snapshot: &Snapshot) -> Result<RasterImage, CodecError> {
    decode_png(&png_bytes(snapshot)?)
}

/// Extract the raw PNG file carried by a snapshot.
pub fn png_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, CodecError> {
    if snapshot.is_clear() {
        return Err(CodecError::ClearSentinel);
    }
    let (media_type, payload) = split_data_url(snapshot.as_str())?;
    if media_type != "image/png" {
        return Err(CodecError::UnsupportedMediaType(media_type.to_string()));
    }
    Ok(STANDARD.decode(payload)?)
}

/// Wrap a raw PNG file as a snapshot.
pub fn from_png_bytes(png: &[u8]) -> Snapshot {
    let mut data_url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png.len() * 4 / 3 + 4);
    data_url.push_str(PNG_DATA_URL_PREFIX);
    STANDARD.encode_string(png, &mut data_url);
    Snapshot(data_url)
}

/// Split `data:<media-type>;base64,<payload>`.
fn split_data_url(data_url: &str) -> Result<(&str, &str), CodecError> {
    let rest = data_url.strip_prefix("data:").ok_or(CodecError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(CodecError::NotDataUrl)?;
    let media_type = header.strip_suffix(";base64").ok_or(CodecError::NotDataUrl)?;
    Ok((media_type, payload))
}

/// Encode straight-alpha RGBA8 pixels as PNG.
pub fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Decode a PNG into straight-alpha RGBA8.
pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, CodecError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());

    let pixels = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => return Err(CodecError::UnsupportedColor(other)),
    };

    Ok(RasterImage {
        width: info.width,
        height: info.height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PenColor;
    use crate::surface::{Composite, PixelSurface, StrokeStyle};
    use kurbo::Point;

    #[test]
    fn test_clear_sentinel() {
        assert!(Snapshot::clear().is_clear());
        assert!(Snapshot::default().is_clear());
        assert!(matches!(decode(&Snapshot::clear()), Err(CodecError::ClearSentinel)));
    }

    #[test]
    fn test_encode_produces_png_data_url() {
        let surface = PixelSurface::new(8, 8);
        let snapshot = encode(&surface).unwrap();
        assert!(snapshot.as_str().starts_with(PNG_DATA_URL_PREFIX));
        assert!(!snapshot.is_clear());
    }

    #[test]
    fn test_encode_then_apply_reproduces_surface() {
        let mut surface = PixelSurface::new(64, 48);
        let style = StrokeStyle {
            color: PenColor::new(236, 72, 153, 200),
            width: 5.0,
            composite: Composite::SourceOver,
        };
        surface.stroke_segment(Point::new(4.0, 4.0), Point::new(60.0, 40.0), &style);
        surface.stroke_segment(Point::new(60.0, 4.0), Point::new(4.0, 40.0), &style);

        let snapshot = encode(&surface).unwrap();
        let image = decode(&snapshot).unwrap();

        let mut restored = PixelSurface::new(64, 48);
        restored.replace(&image);
        assert_eq!(restored, surface);
    }

    #[test]
    fn test_rejects_malformed_data_urls() {
        let cases = [
            "hello",
            "data:image/png,abcd",
            "data:image/png;base64",
        ];
        for case in cases {
            let result = decode(&Snapshot::from_data_url(case));
            assert!(matches!(result, Err(CodecError::NotDataUrl)), "{case}");
        }

        let jpeg = Snapshot::from_data_url("data:image/jpeg;base64,AAAA");
        assert!(matches!(decode(&jpeg), Err(CodecError::UnsupportedMediaType(_))));

        let garbage = Snapshot::from_data_url("data:image/png;base64,!!!");
        assert!(matches!(decode(&garbage), Err(CodecError::Base64(_))));

        let not_png = Snapshot::from_data_url("data:image/png;base64,aGVsbG8=");
        assert!(matches!(decode(&not_png), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_decode_rgb_png_is_opaque() {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 1, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[10, 20, 30]).unwrap();
        }
        let image = decode_png(&out).unwrap();
        assert_eq!(image.pixel(0, 0), Some(PenColor::rgb(10, 20, 30)));
    }
}
