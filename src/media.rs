//! # Media Data Model Module
//!
//! Questo modulo definisce il data model condiviso della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `SizeClass` (thumbnail/small/medium/large + pseudo original)
//! - Definisce `OutputFormat` (webp/jpeg/png) con estensioni e MIME
//! - Definisce `OriginalAsset`, `Variant` e `ProcessingResult`
//! - Calcola il compression ratio aggregato (può essere negativo)
//!
//! ## Invarianti:
//! - Il lato lungo di una variante non supera mai il bound della size-class,
//!   aspect ratio preservato; l'upscaling è permesso per originali piccoli
//! - Al massimo una variante per cella (size-class x format), esclusa la
//!   pseudo-classe "original" che ripubblica i byte sorgente

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Named bounding-box preset used to resize an original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// 150px bounding box
    Thumbnail,
    /// 300px bounding box
    Small,
    /// 600px bounding box
    Medium,
    /// 1200px bounding box
    Large,
    /// Pseudo-class: republishes the source bytes without re-encoding
    Original,
}

impl SizeClass {
    /// Long-edge bound in pixels, or `None` for the original pseudo-class.
    pub fn bound(&self) -> Option<u32> {
        match self {
            Self::Thumbnail => Some(150),
            Self::Small => Some(300),
            Self::Medium => Some(600),
            Self::Large => Some(1200),
            Self::Original => None,
        }
    }

    /// Filename suffix for this size class.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Original => "original",
        }
    }

    /// The resized classes, ascending by bound. The original pseudo-class is
    /// handled separately by the engine and the cleanup coordinator.
    pub fn resized() -> &'static [SizeClass] {
        &[
            SizeClass::Thumbnail,
            SizeClass::Small,
            SizeClass::Medium,
            SizeClass::Large,
        ]
    }
}

/// Output encoding for a variant cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension used in storage paths.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Intrinsic properties of a decoded original, as persisted by collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginalAsset {
    /// Original filename as uploaded (with extension)
    pub filename: String,
    /// Destination category/folder
    pub category: String,
    pub width: u32,
    pub height: u32,
    /// Container format of the source bytes (e.g. "jpg", "png")
    pub format: String,
    pub byte_size: u64,
    pub has_alpha: bool,
    /// EXIF orientation tag, 1-8 (1 = no transform)
    pub orientation: u8,
    /// First 16 hex chars of the SHA-256 of the source bytes
    pub content_hash: String,
}

/// One resized and re-encoded rendition of an original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub size_class: SizeClass,
    /// Output encoding of the cell. `None` for the original-class
    /// republication, which keeps the source container untouched (see
    /// `OriginalAsset::format`); a PDF or GIF has no `OutputFormat`.
    pub format: Option<OutputFormat>,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    /// Filesystem path the variant was written to
    pub storage_path: PathBuf,
    /// Public URL mirroring the storage path
    pub public_url: String,
}

/// The full output of processing one original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub original: OriginalAsset,
    /// Ordered variant list: resized cells first (ascending bound, formats in
    /// matrix order), the original-class republication last.
    pub variants: Vec<Variant>,
    /// Sum of re-encoded variant bytes (original pseudo-class excluded)
    pub total_variant_bytes: u64,
    /// `(original - variants) / original * 100`; negative when upscaled tiny
    /// originals produce more bytes than the source. Expected, not an error.
    pub compression_ratio: f64,
}

impl ProcessingResult {
    /// The re-encoded variants, excluding the original-class republication.
    pub fn resized_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants
            .iter()
            .filter(|v| v.size_class != SizeClass::Original)
    }

    pub(crate) fn compute_ratio(original_bytes: u64, variant_bytes: u64) -> f64 {
        if original_bytes == 0 {
            return 0.0;
        }
        (original_bytes as f64 - variant_bytes as f64) / original_bytes as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_class_bounds_ascending() {
        let bounds: Vec<u32> = SizeClass::resized()
            .iter()
            .map(|c| c.bound().unwrap())
            .collect();
        assert_eq!(bounds, vec![150, 300, 600, 1200]);
    }

    #[test]
    fn test_original_has_no_bound() {
        assert_eq!(SizeClass::Original.bound(), None);
        assert_eq!(SizeClass::Original.suffix(), "original");
    }

    #[test]
    fn test_ratio_can_be_negative() {
        // Upscaled tiny originals legitimately grow
        let ratio = ProcessingResult::compute_ratio(1000, 4000);
        assert!(ratio < 0.0);

        let ratio = ProcessingResult::compute_ratio(10_000, 2_500);
        assert!((ratio - 75.0).abs() < f64::EPSILON);

        assert_eq!(ProcessingResult::compute_ratio(0, 100), 0.0);
    }
}
