//! Upload validation: declared-type whitelist checks and full image decode.
//!
//! The whitelist checks are cheap string comparisons and run first. The
//! content validator then decodes the image completely; header metadata can
//! lie about dimensions, so the decode itself is the authority. Decoder
//! limits cap allocation before any pixel buffer is reserved.

use std::io::Cursor;
use std::path::Path;

use image::{GenericImageView, ImageFormat, ImageReader, Limits};

use rentiva_core::RejectionReason;

/// Declared-type validator: extension, content type, byte size, and the
/// extension/content-type cross-match that defeats spoofed headers.
pub struct MediaValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
    allowed_content_types: Vec<String>,
}

impl MediaValidator {
    pub fn new(
        max_file_size: u64,
        allowed_extensions: Vec<String>,
        allowed_content_types: Vec<String>,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
            allowed_content_types,
        }
    }

    pub fn validate_file_size(&self, size: u64) -> Result<(), RejectionReason> {
        if size == 0 {
            return Err(RejectionReason::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(RejectionReason::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Extract and whitelist-check the lowercased extension.
    pub fn validate_extension(&self, filename: &str) -> Result<String, RejectionReason> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| RejectionReason::ExtensionNotAllowed(filename.to_string()))?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(RejectionReason::ExtensionNotAllowed(extension));
        }

        Ok(extension)
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), RejectionReason> {
        let normalized = content_type.to_lowercase();

        if !self
            .allowed_content_types
            .iter()
            .any(|ct| ct == &normalized)
        {
            return Err(RejectionReason::MimeNotAllowed(content_type.to_string()));
        }

        Ok(())
    }

    /// Reject uploads whose declared Content-Type does not match their
    /// extension (renamed-file spoofing).
    pub fn validate_extension_content_type_match(
        &self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), RejectionReason> {
        let normalized = content_type.to_lowercase();

        let expected: &[&str] = match extension {
            "jpg" | "jpeg" => &["image/jpeg"],
            "png" => &["image/png"],
            "gif" => &["image/gif"],
            "webp" => &["image/webp"],
            _ => return Ok(()),
        };

        if !expected.iter().any(|ct| ct == &normalized) {
            return Err(RejectionReason::MimeExtensionMismatch {
                mime: content_type.to_string(),
                extension: extension.to_string(),
            });
        }

        Ok(())
    }

    /// Run every declared-type check; returns the normalized extension.
    pub fn validate_all(
        &self,
        filename: &str,
        content_type: &str,
        file_size: u64,
    ) -> Result<String, RejectionReason> {
        self.validate_file_size(file_size)?;
        let extension = self.validate_extension(filename)?;
        self.validate_content_type(content_type)?;
        self.validate_extension_content_type_match(&extension, content_type)?;
        Ok(extension)
    }
}

/// Dimensions and format obtained from a successful full decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Full-decode image validator.
pub struct ImageContentValidator {
    min_dimension: u32,
    max_dimension: u32,
    max_pixels: u64,
}

impl ImageContentValidator {
    pub fn new(min_dimension: u32, max_dimension: u32, max_pixels: u64) -> Self {
        Self {
            min_dimension,
            max_dimension,
            max_pixels,
        }
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits
    }

    fn format_allowed(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP
        )
    }

    /// Probe the header for claimed dimensions, enforce the bounds and pixel
    /// ceiling, then decode every pixel. Bounds run before the decode so a
    /// claimed 50000x50000 image never allocates its buffer. The header
    /// probe reads no pixel data, so it carries no decode limits of its own.
    pub fn validate(&self, data: &[u8]) -> Result<DecodedImageInfo, RejectionReason> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|_| RejectionReason::UnreadableImage)?;

        let format = reader.format().ok_or(RejectionReason::UnreadableImage)?;
        if !Self::format_allowed(format) {
            return Err(RejectionReason::FormatNotAllowed(format!("{:?}", format)));
        }

        let (width, height) = reader
            .into_dimensions()
            .map_err(|_| RejectionReason::UnreadableImage)?;

        self.check_bounds(width, height)?;

        // Header checked out; now decode for real. Truncated or corrupt
        // payloads with a genuine signature die here.
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|_| RejectionReason::UnreadableImage)?;
        reader.limits(self.decode_limits());

        let img = reader
            .decode()
            .map_err(|_| RejectionReason::UnreadableImage)?;

        // The decoded size is the authority, not the header claim.
        let (width, height) = img.dimensions();
        self.check_bounds(width, height)?;

        Ok(DecodedImageInfo {
            width,
            height,
            format,
        })
    }

    fn check_bounds(&self, width: u32, height: u32) -> Result<(), RejectionReason> {
        if width < self.min_dimension
            || height < self.min_dimension
            || width > self.max_dimension
            || height > self.max_dimension
        {
            return Err(RejectionReason::DimensionsOutOfBounds { width, height });
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_pixels {
            return Err(RejectionReason::PixelCeilingExceeded {
                pixels,
                ceiling: self.max_pixels,
            });
        }

        Ok(())
    }
}
