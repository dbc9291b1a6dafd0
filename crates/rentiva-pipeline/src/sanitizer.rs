//! Safety re-encoding of validated images.
//!
//! Decoded pixels are re-encoded into canonical JPEG at a fixed quality by a
//! trusted encoder. No attacker-controlled bytes survive: metadata blocks,
//! trailing payloads, and format-structure tricks are all discarded with the
//! original byte stream.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};

/// Every sanitized file ends up in this format.
pub const CANONICAL_EXTENSION: &str = "jpg";
pub const CANONICAL_CONTENT_TYPE: &str = "image/jpeg";

pub struct Sanitizer {
    quality: u8,
}

impl Sanitizer {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    /// Decode `data` and re-encode the pixels as JPEG. Alpha channels are
    /// flattened since JPEG carries none.
    pub fn reencode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("format detection failed")?
            .decode()
            .context("decode failed")?;

        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

        let mut out = Cursor::new(Vec::new());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
            .context("JPEG encode failed")?;

        Ok(out.into_inner())
    }
}
