//! Magic-byte signature verification.
//!
//! Compares the leading bytes of a file against the signatures its declared
//! extension requires. A renamed file (shell script saved as `photo.jpg`)
//! fails here before any decoder touches it. No false negatives are
//! tolerated: any mismatch is a hard rejection.

use rentiva_core::RejectionReason;

/// Number of leading bytes inspected.
pub const SIGNATURE_WINDOW: usize = 12;

pub const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Verify that the leading bytes of `data` carry the signature required by
/// `extension` (lowercased). Unknown extensions fail closed.
pub fn verify_signature(extension: &str, data: &[u8]) -> Result<(), RejectionReason> {
    let head = &data[..data.len().min(SIGNATURE_WINDOW)];

    let matches = match extension {
        "jpg" | "jpeg" => head.starts_with(JPEG_SOI),
        "png" => head.starts_with(PNG_SIGNATURE),
        "gif" => head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a"),
        // RIFF container: "RIFF" at 0, chunk size at 4..8, "WEBP" fourCC at 8.
        "webp" => head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP",
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(RejectionReason::SignatureMismatch)
    }
}
