//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della pipeline
//! - Definisce `RetryPolicy`, il value object immutabile per il backoff
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `media_root`: Directory radice per i file `processed/` (default: ".")
//! - `public_base_url`: Prefisso pubblico che rispecchia lo storage (default: "")
//! - `png_variants`: Abilita le celle PNG oltre a WebP/JPEG (default: false)
//! - `max_original_bytes`: Dimensione massima di un originale (default: 15 MiB)
//! - `allowed_mime`: Allow-list MIME per l'upload (immagini + pass-through)
//! - `retry`: Policy di retry per il transport (3 tentativi, 1s..10s, x2)
//! - `inter_job_delay_ms`: Pausa fissa tra job di un batch (default: 500ms)
//! - `json_output`: Output NDJSON per uso programmatico (default: false)
//!
//! ## Validazione:
//! - Controlla che max_original_bytes sia nel range 10-20 MB
//! - Controlla che backoff_factor sia > 1.0 e base <= max delay
//! - Controlla che media_root esista se specificata esplicitamente

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Immutable backoff policy for the upload transport.
///
/// `delay_for(n) = min(base_delay * backoff_factor^n, max_delay)`; the
/// sequence is non-decreasing and capped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any computed delay, in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied per retry
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `n` (0-based).
    pub fn delay_for(&self, n: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.backoff_factor.powi(n as i32);
        Duration::from_millis((raw as u64).min(self.max_delay_ms))
    }
}

/// Configuration for the media ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory under which `processed/{category}/...` is written
    pub media_root: PathBuf,
    /// Public URL prefix mirroring the storage layout (no trailing slash)
    pub public_base_url: String,
    /// Also produce PNG variant cells (WebP and JPEG are always produced)
    pub png_variants: bool,
    /// Maximum accepted size for an original upload, in bytes
    pub max_original_bytes: u64,
    /// MIME types accepted by the upload gate
    pub allowed_mime: Vec<String>,
    /// Backoff policy shared by all upload jobs
    pub retry: RetryPolicy,
    /// Fixed pause between sequential batch jobs, in milliseconds
    pub inter_job_delay_ms: u64,
    /// Output progress and results as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            public_base_url: String::new(),
            png_variants: false,
            max_original_bytes: 15 * 1024 * 1024,
            allowed_mime: default_allowed_mime(),
            retry: RetryPolicy::default(),
            inter_job_delay_ms: 500,
            json_output: false,
        }
    }
}

fn default_allowed_mime() -> Vec<String> {
    // Images are processed into variants; the rest pass through unprocessed.
    [
        "image/jpeg",
        "image/png",
        "image/webp",
        "image/gif",
        "application/pdf",
        "video/mp4",
        "video/webm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        const MB_10: u64 = 10 * 1024 * 1024;
        const MB_20: u64 = 20 * 1024 * 1024;

        if self.max_original_bytes < MB_10 || self.max_original_bytes > MB_20 {
            return Err(anyhow::anyhow!(
                "Maximum original size must be between 10 and 20 MB"
            ));
        }

        if self.retry.backoff_factor <= 1.0 {
            return Err(anyhow::anyhow!("Backoff factor must be greater than 1.0"));
        }

        if self.retry.base_delay_ms == 0 || self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(anyhow::anyhow!(
                "Base delay must be positive and not exceed the maximum delay"
            ));
        }

        if self.allowed_mime.is_empty() {
            return Err(anyhow::anyhow!("MIME allow-list must not be empty"));
        }

        if !self.media_root.exists() {
            return Err(anyhow::anyhow!(
                "Media root does not exist: {}",
                self.media_root.display()
            ));
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Whether a MIME type passes the upload allow-list.
    pub fn is_mime_allowed(&self, mime: &str) -> bool {
        self.allowed_mime.iter().any(|m| m == mime)
    }
}
