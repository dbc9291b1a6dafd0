//! Polyglot detection over the file header window.
//!
//! A well-formed single-format file carries exactly one signature. A file
//! that matches two or more parsers simultaneously (image + executable,
//! image + script) is a classic upload-bypass payload and is rejected
//! outright.

use std::collections::HashSet;

use crate::signature::{JPEG_SOI, PNG_SIGNATURE};

/// Number of leading bytes scanned for secondary signatures.
pub const HEADER_WINDOW: usize = 100;

/// Format family tags recognized inside the header window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectedType {
    Jpeg,
    Png,
    Gif,
    Webp,
    WindowsExecutable,
    Elf,
    MachO,
    Wasm,
    Shebang,
    Html,
    ScriptTag,
    Php,
    Pdf,
    ZipArchive,
}

impl DetectedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedType::Jpeg => "jpeg",
            DetectedType::Png => "png",
            DetectedType::Gif => "gif",
            DetectedType::Webp => "webp",
            DetectedType::WindowsExecutable => "windows_executable",
            DetectedType::Elf => "elf",
            DetectedType::MachO => "mach_o",
            DetectedType::Wasm => "wasm",
            DetectedType::Shebang => "shebang",
            DetectedType::Html => "html",
            DetectedType::ScriptTag => "script_tag",
            DetectedType::Php => "php",
            DetectedType::Pdf => "pdf",
            DetectedType::ZipArchive => "zip",
        }
    }
}

// (tag, marker) pairs matched anywhere in the window.
const MARKERS: &[(DetectedType, &[u8])] = &[
    (DetectedType::Jpeg, JPEG_SOI),
    (DetectedType::Png, PNG_SIGNATURE),
    (DetectedType::Gif, b"GIF87a"),
    (DetectedType::Gif, b"GIF89a"),
    (DetectedType::Webp, b"WEBP"),
    (DetectedType::WindowsExecutable, &[0x4D, 0x5A]),
    (DetectedType::Elf, &[0x7F, 0x45, 0x4C, 0x46]),
    (DetectedType::MachO, &[0xFE, 0xED, 0xFA, 0xCE]),
    (DetectedType::MachO, &[0xFE, 0xED, 0xFA, 0xCF]),
    (DetectedType::MachO, &[0xCA, 0xFE, 0xBA, 0xBE]),
    (DetectedType::Wasm, &[0x00, 0x61, 0x73, 0x6D]),
    (DetectedType::Shebang, b"#!"),
    (DetectedType::Html, b"<html"),
    (DetectedType::Html, b"<!DOCTYPE"),
    (DetectedType::ScriptTag, b"<script"),
    (DetectedType::Php, b"<?php"),
    (DetectedType::Pdf, b"%PDF"),
    (DetectedType::ZipArchive, &[0x50, 0x4B, 0x03, 0x04]),
];

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// All format tags whose signature appears anywhere in the first
/// [`HEADER_WINDOW`] bytes.
pub fn detect_types(data: &[u8]) -> HashSet<DetectedType> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let mut detected = HashSet::new();

    for (tag, marker) in MARKERS {
        if contains(window, marker) {
            detected.insert(*tag);
        }
    }

    detected
}

/// True when two or more distinct format families match the header window.
pub fn is_polyglot(detected: &HashSet<DetectedType>) -> bool {
    detected.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_png() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        // IHDR chunk header, enough to look like a real file start.
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&[0; 17]);
        data
    }

    #[test]
    fn single_png_is_not_polyglot() {
        let detected = detect_types(&minimal_png());
        assert_eq!(detected, HashSet::from([DetectedType::Png]));
        assert!(!is_polyglot(&detected));
    }

    #[test]
    fn png_with_mz_trailer_is_polyglot() {
        let mut data = minimal_png();
        data.extend_from_slice(&[0x4D, 0x5A, 0x90, 0x00]);

        let detected = detect_types(&data);
        assert!(detected.contains(&DetectedType::Png));
        assert!(detected.contains(&DetectedType::WindowsExecutable));
        assert!(is_polyglot(&detected));
    }

    #[test]
    fn jpeg_with_embedded_script_tag_is_polyglot() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend_from_slice(b"<script>alert(1)</script>");

        let detected = detect_types(&data);
        assert!(is_polyglot(&detected));
    }

    #[test]
    fn shebang_alone_is_single_type() {
        let detected = detect_types(b"#!/bin/sh\necho hi\n");
        assert_eq!(detected, HashSet::from([DetectedType::Shebang]));
        assert!(!is_polyglot(&detected));
    }

    #[test]
    fn marker_beyond_window_is_ignored() {
        let mut data = minimal_png();
        data.resize(HEADER_WINDOW, 0);
        data.extend_from_slice(&[0x4D, 0x5A]);

        let detected = detect_types(&data);
        assert_eq!(detected, HashSet::from([DetectedType::Png]));
    }

    #[test]
    fn empty_input_detects_nothing() {
        assert!(detect_types(&[]).is_empty());
    }
}
