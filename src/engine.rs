//! # Variant Engine Module
//!
//! Questo modulo produce la matrice di varianti ridimensionate e
//! ri-codificate per un originale caricato.
//!
//! ## Responsabilità:
//! - Decodifica l'originale tramite MetadataExtractor (hard gate)
//! - Produce una variante per ogni cella (size-class x formato)
//! - Ripubblica i byte sorgente sotto la pseudo-classe "original"
//! - Calcola il compression ratio aggregato dai byte reali codificati
//!
//! ## Resize policy:
//! - Fit-inside nel bounding box della size-class, aspect ratio preservato
//! - Upscaling permesso: ogni size-class ha sempre una rendition, anche per
//!   originali piccoli (il ratio può diventare negativo: atteso)
//! - Filtro Lanczos3, orientamento EXIF applicato prima del resize
//!
//! ## Encoding policy (costanti fisse, non configurabili dal chiamante):
//! - WebP: quality 80 (lossy)
//! - JPEG: quality 85
//! - PNG: compressione Best, filtro Adaptive
//!
//! ## Failure policy:
//! - `Decode` sull'originale: fatale, abortisce l'intero asset
//! - Errore su una singola cella: loggato e cella omessa dal risultato
//!   ("omit and continue", applicato consistentemente, mai misto)

use crate::config::Config;
use crate::error::PipelineError;
use crate::media::{OriginalAsset, OutputFormat, ProcessingResult, SizeClass, Variant};
use crate::metadata::MetadataExtractor;
use crate::paths::VariantPaths;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed lossy WebP quality for every variant cell
const WEBP_QUALITY: f32 = 80.0;
/// Fixed JPEG quality for every variant cell
const JPEG_QUALITY: u8 = 85;

/// One encoded cell, before it is written to storage.
struct EncodedCell {
    size_class: SizeClass,
    format: OutputFormat,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

/// Produces the resized/re-encoded output matrix for one original.
pub struct VariantEngine {
    paths: VariantPaths,
    formats: Vec<OutputFormat>,
}

impl VariantEngine {
    pub fn new(config: &Config) -> Self {
        let mut formats = vec![OutputFormat::WebP, OutputFormat::Jpeg];
        if config.png_variants {
            formats.push(OutputFormat::Png);
        }
        Self {
            paths: VariantPaths::new(&config.media_root, &config.public_base_url),
            formats,
        }
    }

    /// Process one original: decode, produce every cell, republish the
    /// source bytes, and aggregate the metrics.
    ///
    /// # Errors
    /// - `PipelineError::Decode` if the original cannot be decoded (fatal,
    ///   nothing is written)
    /// - `PipelineError::Io` if storage cannot be written
    ///
    /// A failed individual cell is logged and omitted, never propagated.
    pub async fn process(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        category: &str,
    ) -> Result<ProcessingResult, PipelineError> {
        let content_hash = short_hash(&bytes);
        let source_bytes = Arc::new(bytes);

        // Hard gate: no metadata, no processing
        let decode_input = Arc::clone(&source_bytes);
        let decoded = tokio::task::spawn_blocking(move || MetadataExtractor::extract(&decode_input))
            .await
            .map_err(|e| PipelineError::Decode(format!("decode task failed: {}", e)))??;

        let metadata = decoded.metadata;
        let original = OriginalAsset {
            filename: filename.to_string(),
            category: category.to_string(),
            width: metadata.width,
            height: metadata.height,
            format: metadata.format.clone(),
            byte_size: metadata.byte_size,
            has_alpha: metadata.has_alpha,
            orientation: metadata.orientation,
            content_hash,
        };

        // Orient once, then share the pixels across all cell encoders
        let mut image = decoded.image;
        if let Some(orientation) = Orientation::from_exif(metadata.orientation) {
            image.apply_orientation(orientation);
        }
        let image = Arc::new(image);

        debug!(
            "Processing {}x{} {} original '{}' into {} cells",
            metadata.width,
            metadata.height,
            metadata.format,
            filename,
            SizeClass::resized().len() * self.formats.len()
        );

        // Per-cell encodes are CPU-bound and independent; one blocking task
        // per size class resizes once and encodes every format from it
        let mut handles = Vec::new();
        for &size_class in SizeClass::resized() {
            let image = Arc::clone(&image);
            let formats = self.formats.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                encode_class(&image, size_class, &formats)
            }));
        }

        let mut cell_results: Vec<Result<EncodedCell, PipelineError>> = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(cells) => cell_results.extend(cells),
                Err(e) => warn!("Encode task panicked, cells dropped: {}", e),
            }
        }
        let cells = finalize_cells(cell_results);

        // Write the surviving cells; the directory may be created
        // concurrently by another asset of the same category
        self.paths.ensure_category_dir(category).await.map_err(io_error)?;

        let mut variants = Vec::new();
        let mut total_variant_bytes: u64 = 0;

        for cell in cells {
            let storage_path =
                self.paths
                    .cell_path(category, filename, cell.size_class, cell.format);
            if let Err(e) = tokio::fs::write(&storage_path, &cell.bytes).await {
                warn!(
                    "Failed to write variant {}: {} - cell omitted",
                    storage_path.display(),
                    e
                );
                continue;
            }
            let public_url = self.paths.public_url(&storage_path).map_err(io_error)?;

            total_variant_bytes += cell.bytes.len() as u64;
            variants.push(Variant {
                size_class: cell.size_class,
                format: Some(cell.format),
                width: cell.width,
                height: cell.height,
                byte_size: cell.bytes.len() as u64,
                storage_path,
                public_url,
            });
        }

        // The original pseudo-class republishes the source bytes verbatim
        let original_path = self.paths.original_path(category, filename);
        tokio::fs::write(&original_path, source_bytes.as_slice()).await?;
        let original_url = self.paths.public_url(&original_path).map_err(io_error)?;
        // No OutputFormat here: the source container is republished as-is
        variants.push(Variant {
            size_class: SizeClass::Original,
            format: None,
            width: image.width(),
            height: image.height(),
            byte_size: metadata.byte_size,
            storage_path: original_path,
            public_url: original_url,
        });

        let compression_ratio =
            ProcessingResult::compute_ratio(metadata.byte_size, total_variant_bytes);

        info!(
            "Processed '{}': {} variants, {:.1}% compression",
            filename,
            variants.len(),
            compression_ratio
        );

        Ok(ProcessingResult {
            original,
            variants,
            total_variant_bytes,
            compression_ratio,
        })
    }

    /// Republish a non-image original (allow-listed pass-through types)
    /// under the original pseudo-class only. No variant cells are attempted.
    pub async fn republish_only(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        category: &str,
    ) -> Result<ProcessingResult, PipelineError> {
        let content_hash = short_hash(&bytes);
        self.paths.ensure_category_dir(category).await.map_err(io_error)?;

        let original_path = self.paths.original_path(category, filename);
        tokio::fs::write(&original_path, &bytes).await?;
        let public_url = self.paths.public_url(&original_path).map_err(io_error)?;

        let extension = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("bin");
        let original = OriginalAsset {
            filename: filename.to_string(),
            category: category.to_string(),
            width: 0,
            height: 0,
            format: extension.to_lowercase(),
            byte_size: bytes.len() as u64,
            has_alpha: false,
            orientation: 1,
            content_hash,
        };

        let byte_size = original.byte_size;
        Ok(ProcessingResult {
            original,
            variants: vec![Variant {
                size_class: SizeClass::Original,
                format: None,
                width: 0,
                height: 0,
                byte_size,
                storage_path: original_path,
                public_url,
            }],
            total_variant_bytes: 0,
            compression_ratio: 0.0,
        })
    }
}

/// Resize once for a size class and encode every requested format from the
/// resized pixels.
fn encode_class(
    image: &DynamicImage,
    size_class: SizeClass,
    formats: &[OutputFormat],
) -> Vec<Result<EncodedCell, PipelineError>> {
    let bound = match size_class.bound() {
        Some(b) => b,
        None => return Vec::new(),
    };

    // Fit inside the bounding box, aspect preserved. `resize` scales up as
    // well, which guarantees a rendition for every size class.
    let resized = image.resize(bound, bound, FilterType::Lanczos3);
    let (width, height) = (resized.width(), resized.height());

    formats
        .iter()
        .map(|&format| {
            encode_cell(&resized, size_class, format).map(|bytes| EncodedCell {
                size_class,
                format,
                width,
                height,
                bytes,
            })
        })
        .collect()
}

/// Encode one cell with the fixed per-format quality constants.
fn encode_cell(
    image: &DynamicImage,
    size_class: SizeClass,
    format: OutputFormat,
) -> Result<Vec<u8>, PipelineError> {
    let encode_err = |reason: String| PipelineError::Encode {
        size_class: size_class.suffix().to_string(),
        format: format.extension().to_string(),
        reason,
    };

    match format {
        OutputFormat::WebP => {
            let (w, h) = (image.width(), image.height());
            let mem = if image.color().has_alpha() {
                let rgba = image.to_rgba8();
                webp::Encoder::from_rgba(&rgba, w, h).encode(WEBP_QUALITY)
            } else {
                let rgb = image.to_rgb8();
                webp::Encoder::from_rgb(&rgb, w, h).encode(WEBP_QUALITY)
            };
            Ok(mem.to_vec())
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(buf)
        }
        OutputFormat::Png => {
            let rgba = image.to_rgba8();
            let mut buf = Vec::new();
            PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilterType::Adaptive)
                .write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(buf)
        }
    }
}

/// Apply the partial-result policy: failed cells are logged and omitted,
/// surviving cells continue. Never mixed with abort-on-failure.
fn finalize_cells(results: Vec<Result<EncodedCell, PipelineError>>) -> Vec<EncodedCell> {
    let mut cells = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(cell) => cells.push(cell),
            Err(e) => warn!("Variant cell failed, omitted from result: {}", e),
        }
    }
    cells
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)[..16].to_string()
}

fn io_error(e: anyhow::Error) -> PipelineError {
    PipelineError::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            media_root: root.to_path_buf(),
            public_base_url: "https://cdn.example.com".to_string(),
            ..Default::default()
        }
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        // Non-uniform pixels so the encoders do real work
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_full_matrix_for_large_original() {
        let dir = TempDir::new().unwrap();
        let engine = VariantEngine::new(&test_config(dir.path()));

        let bytes = jpeg_bytes(3000, 2000);
        let original_bytes = bytes.len() as u64;
        let result = engine.process(bytes, "vacation.jpg", "gallery").await.unwrap();

        // {150,300,600,1200} x {webp,jpeg} = 8 variants, original excluded
        let resized: Vec<_> = result.resized_variants().collect();
        assert_eq!(resized.len(), 8);
        assert_eq!(result.variants.len(), 9);

        // Every cell carries its encoding; the original-class entry keeps
        // the source container instead of an output format
        assert!(resized.iter().all(|v| v.format.is_some()));
        let original_class = result
            .variants
            .iter()
            .find(|v| v.size_class == SizeClass::Original)
            .unwrap();
        assert_eq!(original_class.format, None);
        assert_eq!(result.original.format, "jpg");

        // Long edge respects the bound, aspect preserved within 1px
        for v in &resized {
            let bound = v.size_class.bound().unwrap();
            assert!(v.width.max(v.height) <= bound);
            let expected_height = (v.width as f64 * 2000.0 / 3000.0).round() as i64;
            assert!((v.height as i64 - expected_height).abs() <= 1);
            assert!(v.storage_path.exists());
            assert!(v.byte_size > 0);
        }

        // Ratio computed from real encoded byte sizes
        let sum: u64 = resized.iter().map(|v| v.byte_size).sum();
        assert_eq!(result.total_variant_bytes, sum);
        let expected =
            ProcessingResult::compute_ratio(original_bytes, sum);
        assert!((result.compression_ratio - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tiny_original_is_upscaled_with_negative_ratio() {
        let dir = TempDir::new().unwrap();
        let engine = VariantEngine::new(&test_config(dir.path()));

        let result = engine
            .process(jpeg_bytes(64, 64), "icon.jpg", "icons")
            .await
            .unwrap();

        let thumb = result
            .resized_variants()
            .find(|v| v.size_class == SizeClass::Thumbnail && v.format == Some(OutputFormat::WebP))
            .unwrap();

        // Every size class has a rendition, so the thumbnail is upscaled
        assert_eq!(thumb.width, 150);
        assert!(thumb.width > 64);

        // Eight upscaled renditions of a 64x64 source outweigh it
        assert!(result.compression_ratio < 0.0);
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = VariantEngine::new(&test_config(dir.path()));

        let result = engine
            .process(b"not an image".to_vec(), "bad.jpg", "gallery")
            .await;
        assert!(matches!(result, Err(PipelineError::Decode(_))));
        assert!(!dir.path().join("processed").exists());
    }

    #[tokio::test]
    async fn test_regeneration_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let engine = VariantEngine::new(&test_config(dir.path()));

        let first = engine
            .process(jpeg_bytes(800, 600), "hero.jpg", "banners")
            .await
            .unwrap();
        let second = engine
            .process(jpeg_bytes(800, 600), "hero.jpg", "banners")
            .await
            .unwrap();

        // Same deterministic paths both runs, no duplicates on disk
        let paths_first: Vec<_> = first.variants.iter().map(|v| &v.storage_path).collect();
        let paths_second: Vec<_> = second.variants.iter().map(|v| &v.storage_path).collect();
        assert_eq!(paths_first, paths_second);

        let files = std::fs::read_dir(dir.path().join("processed/banners"))
            .unwrap()
            .count();
        assert_eq!(files, first.variants.len());
    }

    #[test]
    fn test_failed_cell_is_omitted_not_fatal() {
        // Fixes the documented policy: one failing cell never aborts the
        // asset, the cell is simply absent from the result.
        let good = EncodedCell {
            size_class: SizeClass::Thumbnail,
            format: OutputFormat::WebP,
            width: 150,
            height: 100,
            bytes: vec![1, 2, 3],
        };
        let results = vec![
            Ok(good),
            Err(PipelineError::Encode {
                size_class: "small".to_string(),
                format: "jpg".to_string(),
                reason: "simulated encoder failure".to_string(),
            }),
        ];

        let cells = finalize_cells(results);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].size_class, SizeClass::Thumbnail);
    }

    #[tokio::test]
    async fn test_republish_only_for_pass_through_types() {
        let dir = TempDir::new().unwrap();
        let engine = VariantEngine::new(&test_config(dir.path()));

        let result = engine
            .republish_only(b"%PDF-1.7 fake".to_vec(), "brochure.pdf", "docs")
            .await
            .unwrap();

        assert_eq!(result.variants.len(), 1);
        assert_eq!(result.variants[0].size_class, SizeClass::Original);
        // A PDF has no output encoding; the container lives on the asset
        assert_eq!(result.variants[0].format, None);
        assert_eq!(result.original.format, "pdf");
        assert!(dir
            .path()
            .join("processed/docs/brochure_original.pdf")
            .exists());
    }

    #[test]
    fn test_content_hash_is_16_hex_chars() {
        let hash = short_hash(b"stable input");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, short_hash(b"stable input"));
    }
}
