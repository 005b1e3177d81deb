//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (NDJSON su stdout)
//! per comunicazione con driver programmatici (admin UI / Electron).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio di una run di ingestione
//! - `asset_complete`: Fine elaborazione di un asset (varianti, ratio)
//! - `upload_complete`: Esito terminale di un upload job
//! - `complete`: Fine run con statistiche finali
//! - `error`: Errore generale

use crate::media::ProcessingResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio di una run di ingestione
    #[serde(rename = "start")]
    Start {
        input: PathBuf,
        category: String,
        total_files: usize,
    },

    /// Fine elaborazione di un asset
    #[serde(rename = "asset_complete")]
    AssetComplete {
        filename: String,
        variants: usize,
        original_bytes: u64,
        variant_bytes: u64,
        compression_ratio: f64,
        error: Option<String>,
    },

    /// Esito terminale di un upload job
    #[serde(rename = "upload_complete")]
    UploadComplete {
        path: PathBuf,
        index: usize,
        state: String,
        retry_count: u32,
        error: Option<String>,
    },

    /// Esito di una rimozione varianti
    #[serde(rename = "cleanup_complete")]
    CleanupComplete {
        filename: String,
        category: String,
        removed: usize,
        already_absent: usize,
        failed: usize,
    },

    /// Run completata
    #[serde(rename = "complete")]
    Complete {
        assets_processed: usize,
        variants_written: usize,
        errors: usize,
        average_ratio: f64,
        duration_seconds: f64,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(input: PathBuf, category: String, total_files: usize) -> Self {
        Self::Start {
            input,
            category,
            total_files,
        }
    }

    /// Messaggio di completamento asset da un ProcessingResult riuscito
    pub fn asset_complete(result: &ProcessingResult) -> Self {
        Self::AssetComplete {
            filename: result.original.filename.clone(),
            variants: result.variants.len(),
            original_bytes: result.original.byte_size,
            variant_bytes: result.total_variant_bytes,
            compression_ratio: result.compression_ratio,
            error: None,
        }
    }

    /// Messaggio di completamento asset per un fallimento
    pub fn asset_failed(filename: String, error: String) -> Self {
        Self::AssetComplete {
            filename,
            variants: 0,
            original_bytes: 0,
            variant_bytes: 0,
            compression_ratio: 0.0,
            error: Some(error),
        }
    }

    pub fn complete(
        assets_processed: usize,
        variants_written: usize,
        errors: usize,
        average_ratio: f64,
        duration_seconds: f64,
    ) -> Self {
        Self::Complete {
            assets_processed,
            variants_written,
            errors,
            average_ratio,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
