//! # Cleanup Coordination Module
//!
//! Questo modulo elimina l'intero set di varianti di un asset rimosso.
//!
//! ## Responsabilità:
//! - Calcola ogni path (size-class x formato) che VariantEngine può aver
//!   prodotto per l'asset e lo elimina
//! - Idempotente: un file già assente non è un errore
//! - Best-effort: i fallimenti di delete sono loggati, mai propagati. Un
//!   cleanup fisico fallito non deve mai bloccare la rimozione del record
//!   di metadata che possiede l'asset

use crate::config::Config;
use crate::media::{OutputFormat, SizeClass};
use crate::paths::VariantPaths;
use std::io::ErrorKind;
use tracing::{debug, warn};

/// Best-effort outcome of one cleanup pass, for observability only.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Files actually removed
    pub removed: usize,
    /// Paths that were already absent
    pub already_absent: usize,
    /// Deletes that failed (logged, not escalated)
    pub failed: usize,
}

/// Deletes every variant file an asset could own.
pub struct CleanupCoordinator {
    paths: VariantPaths,
}

/// Every encodable format, regardless of the engine's current config: a
/// config change must not orphan previously produced cells.
const ALL_FORMATS: &[OutputFormat] = &[OutputFormat::WebP, OutputFormat::Jpeg, OutputFormat::Png];

impl CleanupCoordinator {
    pub fn new(config: &Config) -> Self {
        Self {
            paths: VariantPaths::new(&config.media_root, &config.public_base_url),
        }
    }

    /// Remove the whole variant set for `{original_filename, category}`.
    ///
    /// Never returns an error: failures are logged and counted, and calling
    /// this twice for the same asset is safe.
    pub async fn remove_variants(
        &self,
        original_filename: &str,
        category: &str,
    ) -> CleanupOutcome {
        let mut targets = Vec::new();
        for &size_class in SizeClass::resized() {
            for &format in ALL_FORMATS {
                targets.push(self.paths.cell_path(category, original_filename, size_class, format));
            }
        }
        targets.push(self.paths.original_path(category, original_filename));

        let mut outcome = CleanupOutcome::default();
        for path in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed variant file: {}", path.display());
                    outcome.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    outcome.already_absent += 1;
                }
                Err(e) => {
                    warn!("Failed to remove variant file {}: {}", path.display(), e);
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            "Cleanup for '{}' in '{}': {} removed, {} absent, {} failed",
            original_filename, category, outcome.removed, outcome.already_absent, outcome.failed
        );
        outcome
    }
}
