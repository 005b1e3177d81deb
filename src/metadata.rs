//! # Metadata Extraction Module
//!
//! Questo modulo legge le proprietà intrinseche di un originale decodificato.
//!
//! ## Responsabilità:
//! - Decodifica i byte sorgente con la crate `image` (formato auto-rilevato)
//! - Estrae width/height, formato contenitore, byte size, flag alpha,
//!   orientamento EXIF
//! - Fallisce con `PipelineError::Decode` se i byte non sono un contenitore
//!   immagine supportato
//!
//! ## Hard gate:
//! VariantEngine non parte mai senza metadata validi: un `Decode` qui
//! abortisce l'intero ProcessingResult dell'asset.

use crate::error::PipelineError;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;

/// Intrinsic properties read from the decoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetMetadata {
    pub width: u32,
    pub height: u32,
    /// Canonical extension of the detected container (e.g. "jpg", "png")
    pub format: String,
    pub byte_size: u64,
    pub has_alpha: bool,
    /// EXIF orientation tag, 1-8 (1 = no transform)
    pub orientation: u8,
}

/// A successfully decoded original, ready for the variant engine.
pub struct DecodedOriginal {
    pub metadata: AssetMetadata,
    pub image: DynamicImage,
}

/// Reads intrinsic properties of a decoded original. Stateless.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Decode `bytes` and extract metadata.
    ///
    /// # Errors
    /// Returns `PipelineError::Decode` if the bytes are not a supported
    /// image container or the pixel data is corrupt.
    pub fn extract(bytes: &[u8]) -> Result<DecodedOriginal, PipelineError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| PipelineError::Decode("unrecognized image container".to_string()))?;

        let mut decoder = reader.into_decoder()?;
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        let image = DynamicImage::from_decoder(decoder)?;

        let metadata = AssetMetadata {
            width: image.width(),
            height: image.height(),
            format: format
                .extensions_str()
                .first()
                .copied()
                .unwrap_or("bin")
                .to_string(),
            byte_size: bytes.len() as u64,
            has_alpha: image.color().has_alpha(),
            orientation: exif_tag(orientation),
        };

        Ok(DecodedOriginal { metadata, image })
    }
}

fn exif_tag(orientation: Orientation) -> u8 {
    match orientation {
        Orientation::NoTransforms => 1,
        Orientation::FlipHorizontal => 2,
        Orientation::Rotate180 => 3,
        Orientation::FlipVertical => 4,
        Orientation::Rotate90FlipH => 5,
        Orientation::Rotate90 => 6,
        Orientation::Rotate270FlipH => 7,
        Orientation::Rotate270 => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_extracts_dimensions_and_format() {
        let bytes = encode_png(320, 200);
        let decoded = MetadataExtractor::extract(&bytes).unwrap();

        assert_eq!(decoded.metadata.width, 320);
        assert_eq!(decoded.metadata.height, 200);
        assert_eq!(decoded.metadata.format, "png");
        assert_eq!(decoded.metadata.byte_size, bytes.len() as u64);
        assert!(decoded.metadata.has_alpha);
        assert_eq!(decoded.metadata.orientation, 1);
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let result = MetadataExtractor::extract(b"definitely not an image container");
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_rejects_truncated_image() {
        let mut bytes = encode_png(64, 64);
        bytes.truncate(24);
        let result = MetadataExtractor::extract(&bytes);
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn test_jpeg_has_no_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(16, 16));
        let mut buf = Cursor::new(Vec::new());
        // JPEG encoding drops the alpha channel
        img.to_rgb8()
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();

        let decoded = MetadataExtractor::extract(&buf.into_inner()).unwrap();
        assert!(!decoded.metadata.has_alpha);
        assert_eq!(decoded.metadata.format, "jpg");
    }
}
