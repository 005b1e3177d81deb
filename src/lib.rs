//! # Media Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline di ingestione media
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione, `RetryPolicy` e validazione parametri
//! - `error`: Tipi di errore custom (processing e upload, con classificazione)
//! - `media`: Modello dati (size class, formati, varianti, risultati)
//! - `metadata`: Estrazione metadati e gate di decodifica
//! - `paths`: Layout deterministico dello storage e URL pubblici
//! - `engine`: Generazione della matrice di varianti (resize + encode)
//! - `selector`: Selezione responsive delle varianti (srcset/sizes)
//! - `cleanup`: Rimozione best-effort delle varianti di un asset
//! - `file_manager`: Discovery dei media e gate di validazione upload
//! - `upload`: Transport resiliente (retry, cancellazione, batch sequenziale)
//! - `progress`: Progress tracking e statistiche di run
//! - `json_output`: Output NDJSON per driver programmatici
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use media_pipeline::{Config, VariantEngine};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let engine = VariantEngine::new(&config);
//! let bytes = tokio::fs::read("photo.jpg").await?;
//! let result = engine.process(bytes, "photo.jpg", "gallery").await?;
//! println!("{} variants, ratio {:.1}%", result.variants.len(), result.compression_ratio);
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod media;
pub mod metadata;
pub mod paths;
pub mod progress;
pub mod selector;
pub mod upload;

pub use cleanup::{CleanupCoordinator, CleanupOutcome};
pub use config::{Config, RetryPolicy};
pub use engine::VariantEngine;
pub use error::{PipelineError, UploadError};
pub use file_manager::FileManager;
pub use media::{OriginalAsset, OutputFormat, ProcessingResult, SizeClass, Variant};
pub use metadata::MetadataExtractor;
pub use selector::VariantSelector;
pub use upload::{
    cancellation_channel, BatchUploadCoordinator, CancelToken, HttpEndpoint, JobState, TokioClock,
    UploadDestination, UploadReport, UploadTransport,
};
