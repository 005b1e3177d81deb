//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche aggregate
//! di una run della pipeline.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche di ingestione (asset processati, varianti, errori)
//! - Report finali con statistiche aggregate
//!
//! ## Statistiche tracciate:
//! - **assets_processed**: Totale asset elaborati
//! - **variants_written**: Varianti scritte su storage
//! - **assets_passed_through**: Asset non-immagine ripubblicati senza celle
//! - **total_original_bytes / total_variant_bytes**: Byte per il ratio medio
//! - **errors**: Asset falliti (decode o IO)

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a pipeline run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics tracker for one pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub assets_processed: usize,
    pub assets_passed_through: usize,
    pub variants_written: usize,
    pub total_original_bytes: u64,
    pub total_variant_bytes: u64,
    pub errors: usize,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&mut self, original_bytes: u64, variant_bytes: u64, variants: usize) {
        self.assets_processed += 1;
        self.variants_written += variants;
        self.total_original_bytes += original_bytes;
        self.total_variant_bytes += variant_bytes;
    }

    pub fn add_pass_through(&mut self, original_bytes: u64) {
        self.assets_processed += 1;
        self.assets_passed_through += 1;
        self.total_original_bytes += original_bytes;
    }

    pub fn add_error(&mut self) {
        self.assets_processed += 1;
        self.errors += 1;
    }

    /// Aggregate compression ratio across the run; may be negative when the
    /// run was dominated by upscaled tiny originals.
    pub fn overall_ratio_percent(&self) -> f64 {
        if self.total_original_bytes > 0 {
            (self.total_original_bytes as f64 - self.total_variant_bytes as f64)
                / self.total_original_bytes as f64
                * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} assets | Variants: {} | Pass-through: {} | Errors: {} | Ratio: {:.2}%",
            self.assets_processed,
            self.variants_written,
            self.assets_passed_through,
            self.errors,
            self.overall_ratio_percent()
        )
    }
}
