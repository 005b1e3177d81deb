//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery dei media
//! da ingerire.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file supportati in una directory
//! - Mappatura estensione -> MIME per il gate dell'allow-list
//! - Validazione upload (MIME ammesso + dimensione massima)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Gate di ingestione:
//! - Le immagini (jpeg/png/webp/gif) passano al VariantEngine
//! - I tipi pass-through ammessi (pdf/mp4/webm) vengono solo ripubblicati
//! - Tutto il resto viene rifiutato con `Validation`

use crate::config::Config;
use crate::error::PipelineError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

/// Manages file operations, discovery and the upload gate
pub struct FileManager;

impl FileManager {
    /// Get information about a file (size and modification time)
    pub async fn get_file_info(path: &Path) -> Result<(u64, u64)> {
        let metadata = fs::metadata(path).await?;
        let size = metadata.len();
        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs();
        Ok((size, modified))
    }

    /// Find all supported files in a directory, recursively
    pub fn find_media_files(media_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(media_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if Self::mime_for(path).is_some() {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// MIME type for a file based on its extension, or `None` if the
    /// extension is not one the pipeline knows about
    pub fn mime_for(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "pdf" => Some("application/pdf"),
            "mp4" => Some("video/mp4"),
            "webm" => Some("video/webm"),
            _ => None,
        }
    }

    /// Check if a file is an image the engine can process
    pub fn is_image(path: &Path) -> bool {
        matches!(
            Self::mime_for(path),
            Some(mime) if mime.starts_with("image/")
        )
    }

    /// Validate a file against the upload gate: known type, allow-listed
    /// MIME, and within the configured size bound.
    pub fn validate_upload(path: &Path, byte_size: u64, config: &Config) -> Result<(), PipelineError> {
        let mime = Self::mime_for(path)
            .ok_or_else(|| PipelineError::UnsupportedFormat(path.to_path_buf()))?;

        if !config.is_mime_allowed(mime) {
            return Err(PipelineError::Validation(format!(
                "MIME type not allowed: {}",
                mime
            )));
        }

        if byte_size > config.max_original_bytes {
            return Err(PipelineError::Validation(format!(
                "File too large: {} exceeds the {} limit",
                Self::format_size(byte_size),
                Self::format_size(config.max_original_bytes)
            )));
        }

        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
