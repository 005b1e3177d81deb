//! # Media Pipeline - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap` (subcommand)
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e override dai flag CLI
//! - Avvio di processing, upload batch o cleanup
//!
//! ## Subcommand:
//! - `process`: genera la matrice di varianti per un file o una directory
//! - `upload`: carica file sul server, sequenzialmente e con retry
//! - `clean`: rimuove tutte le varianti di un asset
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-pipeline process ./shots --category gallery --png
//! media-pipeline upload a.jpg b.png --endpoint https://cms.example.com/api/upload
//! media-pipeline clean banner.jpg --category home
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use media_pipeline::json_output::JsonMessage;
use media_pipeline::progress::{PipelineStats, ProgressManager};
use media_pipeline::upload::UploadEvent;
use media_pipeline::{
    cancellation_channel, BatchUploadCoordinator, CleanupCoordinator, Config, FileManager,
    HttpEndpoint, JobState, TokioClock, UploadDestination, VariantEngine,
};

#[derive(Parser)]
#[command(name = "media-pipeline")]
#[command(about = "Resilient media ingestion: variant matrix, uploads with retry, cleanup")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit newline-delimited JSON instead of the progress bar
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process originals into their variant matrix
    Process {
        /// A media file, or a directory to scan recursively
        input: PathBuf,

        /// Category under which variants are published
        #[arg(short = 'C', long, default_value = "general")]
        category: String,

        /// Root directory for the processed/ tree
        #[arg(short, long)]
        media_root: Option<PathBuf>,

        /// Public URL prefix mirroring the storage layout
        #[arg(long)]
        base_url: Option<String>,

        /// Also produce PNG variant cells
        #[arg(long)]
        png: bool,
    },

    /// Upload files to the server, one at a time with retry
    Upload {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Upload endpoint URL
        #[arg(short, long)]
        endpoint: String,

        /// Category forwarded to the server
        #[arg(short = 'C', long, default_value = "general")]
        category: String,
    },

    /// Remove every variant of a previously processed asset
    Clean {
        /// Original filename the variants were derived from
        filename: String,

        /// Category the asset was published under
        #[arg(short = 'C', long, default_value = "general")]
        category: String,

        /// Root directory for the processed/ tree
        #[arg(short, long)]
        media_root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    config.json_output = config.json_output || args.json;
    let json_output = config.json_output;

    let result = match args.command {
        Command::Process {
            input,
            category,
            media_root,
            base_url,
            png,
        } => {
            if let Some(root) = media_root {
                config.media_root = root;
            }
            if let Some(url) = base_url {
                config.public_base_url = url;
            }
            config.png_variants = config.png_variants || png;
            run_process(&config, &input, &category).await
        }
        Command::Upload {
            files,
            endpoint,
            category,
        } => {
            run_upload(&config, files, endpoint, category).await
        }
        Command::Clean {
            filename,
            category,
            media_root,
        } => {
            if let Some(root) = media_root {
                config.media_root = root;
            }
            run_clean(&config, &filename, &category).await
        }
    };

    // Programmatic drivers read failures from the NDJSON stream, not stderr
    if let Err(e) = &result {
        if json_output {
            let details = e.chain().nth(1).map(|cause| cause.to_string());
            JsonMessage::error(e.to_string(), details).emit();
        }
    }
    result
}

async fn run_process(config: &Config, input: &PathBuf, category: &str) -> Result<()> {
    config.validate()?;
    if !input.exists() {
        return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
    }

    let files = if input.is_dir() {
        FileManager::find_media_files(input)?
    } else {
        vec![input.clone()]
    };

    if files.is_empty() {
        info!("No supported media files found in {}", input.display());
        return Ok(());
    }

    let engine = VariantEngine::new(config);
    let mut stats = PipelineStats::new();
    let started = Instant::now();

    let progress = if config.json_output {
        JsonMessage::start(input.clone(), category.to_string(), files.len()).emit();
        None
    } else {
        Some(ProgressManager::new(files.len() as u64))
    };

    for file in &files {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        let is_image = FileManager::is_image(file);
        let outcome = ingest_one(&engine, config, file, &filename, category).await;

        match outcome {
            Ok(result) => {
                if is_image {
                    stats.add_processed(
                        result.original.byte_size,
                        result.total_variant_bytes,
                        result.resized_variants().count(),
                    );
                } else {
                    stats.add_pass_through(result.original.byte_size);
                }
                if config.json_output {
                    JsonMessage::asset_complete(&result).emit();
                }
            }
            Err(e) => {
                warn!("Failed to process {}: {}", filename, e);
                stats.add_error();
                if config.json_output {
                    JsonMessage::asset_failed(filename.clone(), e.to_string()).emit();
                }
            }
        }

        if let Some(progress) = &progress {
            progress.update(&filename);
        }
    }

    let duration = started.elapsed().as_secs_f64();
    if config.json_output {
        JsonMessage::complete(
            stats.assets_processed,
            stats.variants_written,
            stats.errors,
            stats.overall_ratio_percent(),
            duration,
        )
        .emit();
    } else if let Some(progress) = &progress {
        progress.finish(&stats.format_summary());
    }

    Ok(())
}

/// Route one file through the engine: images get the full variant matrix,
/// allow-listed pass-through types are republished as-is.
async fn ingest_one(
    engine: &VariantEngine,
    config: &Config,
    file: &PathBuf,
    filename: &str,
    category: &str,
) -> Result<media_pipeline::ProcessingResult> {
    let bytes = tokio::fs::read(file).await?;
    FileManager::validate_upload(file, bytes.len() as u64, config)?;

    let result = if FileManager::is_image(file) {
        engine.process(bytes, filename, category).await?
    } else {
        engine.republish_only(bytes, filename, category).await?
    };
    Ok(result)
}

async fn run_upload(
    config: &Config,
    files: Vec<PathBuf>,
    endpoint: String,
    category: String,
) -> Result<()> {
    config.validate()?;
    let destination = UploadDestination { endpoint, category };
    let coordinator = BatchUploadCoordinator::new(
        Arc::new(HttpEndpoint::new()?),
        Arc::new(TokioClock),
        config.clone(),
    );

    // Ctrl-C requests cooperative cancellation: the in-flight job stops at
    // the next chunk, queued jobs never start
    let (cancel_tx, cancel_token) = cancellation_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, stopping after the current chunk");
            let _ = cancel_tx.send(());
        }
    });

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = if config.json_output {
        None
    } else {
        Some(ProgressManager::new(files.len() as u64))
    };
    let event_progress = progress.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(progress) = &event_progress {
                match event {
                    UploadEvent::Progress {
                        bytes_sent,
                        total_bytes,
                    } => progress.set_message(&format!(
                        "{} / {}",
                        FileManager::format_size(bytes_sent),
                        FileManager::format_size(total_bytes)
                    )),
                    UploadEvent::Retrying { attempt, delay } => progress
                        .set_message(&format!("retry {} in {:.0?}", attempt, delay)),
                    UploadEvent::Terminal { .. } => progress.update(""),
                }
            }
        }
    });

    let reports = coordinator
        .run(&files, &destination, Some(events_tx), cancel_token)
        .await;
    event_task.await?;

    let mut failed = 0usize;
    for (index, report) in reports.iter().enumerate() {
        if config.json_output {
            JsonMessage::UploadComplete {
                path: report.file.clone(),
                index,
                state: format!("{:?}", report.state).to_lowercase(),
                retry_count: report.retry_count,
                error: report.last_error.clone(),
            }
            .emit();
        } else {
            match report.state {
                JobState::Succeeded => info!(
                    "{}: uploaded ({} retries)",
                    report.file.display(),
                    report.retry_count
                ),
                state => {
                    warn!(
                        "{}: {:?}{}",
                        report.file.display(),
                        state,
                        report
                            .last_error
                            .as_deref()
                            .map(|e| format!(" ({})", e))
                            .unwrap_or_default()
                    );
                }
            }
        }
        if report.state != JobState::Succeeded {
            failed += 1;
        }
    }

    let succeeded = reports.len() - failed;
    if let Some(progress) = &progress {
        progress.finish(&format!(
            "{}/{} uploads succeeded",
            succeeded,
            reports.len()
        ));
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{} of {} uploads did not succeed", failed, reports.len()));
    }
    Ok(())
}

async fn run_clean(config: &Config, filename: &str, category: &str) -> Result<()> {
    config.validate()?;
    let coordinator = CleanupCoordinator::new(config);
    let outcome = coordinator.remove_variants(filename, category).await;

    info!(
        "Cleanup for '{}' in '{}': {} removed, {} already absent, {} failed",
        filename, category, outcome.removed, outcome.already_absent, outcome.failed
    );

    if config.json_output {
        JsonMessage::CleanupComplete {
            filename: filename.to_string(),
            category: category.to_string(),
            removed: outcome.removed,
            already_absent: outcome.already_absent,
            failed: outcome.failed,
        }
        .emit();
    }

    Ok(())
}
