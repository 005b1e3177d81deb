//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di storage e degli URL
//! pubblici. Evita duplicazione tra VariantEngine e CleanupCoordinator.
//!
//! ## Layout (deterministico):
//! ```text
//! {media_root}/processed/{category}/{basename}_{size_class}.{format}
//! ```
//! L'URL pubblico rispecchia il path di storage sotto `public_base_url`.
//! La rigenerazione sovrascrive sempre lo stesso path, mai duplicati.

use crate::media::{OutputFormat, SizeClass};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Deterministic storage/URL layout shared by the engine and the cleanup
/// coordinator. Both sides must agree on these paths or cleanup would leak
/// files.
#[derive(Debug, Clone)]
pub struct VariantPaths {
    media_root: PathBuf,
    public_base_url: String,
}

impl VariantPaths {
    pub fn new(media_root: &Path, public_base_url: &str) -> Self {
        Self {
            media_root: media_root.to_path_buf(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Basename of an uploaded filename (extension stripped).
    pub fn basename(original_filename: &str) -> &str {
        match original_filename.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => original_filename,
        }
    }

    /// Directory holding every variant of a category.
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.media_root.join("processed").join(category)
    }

    fn variant_filename(basename: &str, class: SizeClass, extension: &str) -> String {
        format!("{}_{}.{}", basename, class.suffix(), extension)
    }

    /// Storage path for a resized (size-class x format) cell.
    pub fn cell_path(
        &self,
        category: &str,
        original_filename: &str,
        class: SizeClass,
        format: OutputFormat,
    ) -> PathBuf {
        let basename = Self::basename(original_filename);
        self.category_dir(category)
            .join(Self::variant_filename(basename, class, format.extension()))
    }

    /// Storage path for the original-class republication, which keeps the
    /// source extension.
    pub fn original_path(&self, category: &str, original_filename: &str) -> PathBuf {
        let basename = Self::basename(original_filename);
        let extension = original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("bin");
        self.category_dir(category)
            .join(Self::variant_filename(basename, SizeClass::Original, extension))
    }

    /// Public URL mirroring a storage path.
    pub fn public_url(&self, storage_path: &Path) -> Result<String> {
        let relative = storage_path
            .strip_prefix(&self.media_root)
            .map_err(|_| {
                anyhow::anyhow!(
                    "Storage path is outside the media root: {}",
                    storage_path.display()
                )
            })?;
        // URLs always use forward slashes, whatever the host OS does
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(format!("{}/{}", self.public_base_url, segments.join("/")))
    }

    /// Create the category directory, tolerating concurrent creation.
    pub async fn ensure_category_dir(&self, category: &str) -> Result<PathBuf> {
        let dir = self.category_dir(category);
        // create_dir_all succeeds if the directory already exists, which
        // covers the already-exists race between parallel cell encoders
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            anyhow::anyhow!("Failed to create output directory {}: {}", dir.display(), e)
        })?;
        Ok(dir)
    }
}
