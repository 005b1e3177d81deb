//! # Upload Transport Module
//!
//! Questo modulo muove i byte verso il server in modo affidabile: un job
//! per volta, retry con backoff esponenziale, cancellazione cooperativa.
//!
//! ## Responsabilità:
//! - Esegue il loop di tentativi di un singolo UploadJob
//! - Classifica i fallimenti (retryable vs terminale) tramite `UploadError`
//! - Emette eventi di progresso e di retry su un canale sottoscrivibile
//! - Garantisce esattamente un evento terminale per job
//!
//! ## State machine del job:
//! ```text
//! Pending -> Uploading -> { Succeeded | Retrying -> Uploading | Failed | Cancelled }
//! ```
//! Succeeded, Failed e Cancelled sono terminali e mutuamente esclusivi.
//! Un job cancellato termina Cancelled, mai Failed, e non viene mai
//! ritentato dopo la cancellazione.

use crate::config::{Config, RetryPolicy};
use crate::error::UploadError;
use crate::file_manager::FileManager;
use crate::upload::clock::Clock;
use crate::upload::endpoint::{AttemptContext, UploadEndpoint};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Uploading,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Destination descriptor for an upload job.
#[derive(Debug, Clone)]
pub struct UploadDestination {
    /// Upload endpoint URL
    pub endpoint: String,
    /// Category/folder forwarded to the server
    pub category: String,
}

/// Events emitted while a job runs. The terminal event fires exactly once.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Progress { bytes_sent: u64, total_bytes: u64 },
    Retrying { attempt: u32, delay: Duration },
    Terminal { state: JobState },
}

/// Terminal report for one job, indexed into the batch outcome vector.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub file: PathBuf,
    pub state: JobState,
    /// Monotonic, bounded by `RetryPolicy::max_retries`
    pub retry_count: u32,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// Server-assigned ids on success
    pub server_ids: Vec<String>,
    /// Classified user-facing message on failure
    pub last_error: Option<String>,
}

/// Cooperative cancellation capability, polled by the transport loop.
///
/// Backed by a broadcast channel; once a signal is observed the token
/// latches so every later poll stays cancelled.
#[derive(Clone)]
pub struct CancelToken {
    receiver: Arc<Mutex<broadcast::Receiver<()>>>,
    latched: Arc<AtomicBool>,
}

/// Create a cancellation channel: keep the sender, hand the token to jobs.
pub fn cancellation_channel() -> (broadcast::Sender<()>, CancelToken) {
    let (sender, receiver) = broadcast::channel(1);
    (
        sender,
        CancelToken {
            receiver: Arc::new(Mutex::new(receiver)),
            latched: Arc::new(AtomicBool::new(false)),
        },
    )
}

impl CancelToken {
    /// Token that can never be cancelled, for fire-and-forget callers.
    pub fn unstoppable() -> Self {
        let (_sender, token) = cancellation_channel();
        token
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        if self.latched.load(Ordering::Relaxed) {
            return true;
        }
        let cancelled = match self.receiver.lock() {
            Ok(mut receiver) => match receiver.try_recv() {
                Ok(_) => true,
                Err(broadcast::error::TryRecvError::Empty) => false,
                // Signal was sent but we missed it, treat as cancel
                Err(broadcast::error::TryRecvError::Lagged(_)) => true,
                // Sender was dropped, job can never be cancelled anymore
                Err(broadcast::error::TryRecvError::Closed) => false,
            },
            Err(_) => false,
        };
        if cancelled {
            self.latched.store(true, Ordering::Relaxed);
        }
        cancelled
    }
}

/// Forwards byte-level progress to the subscriber and keeps the running
/// count for the terminal report. Fires on the caller's task, not a
/// background pool, so event ordering stays predictable.
#[derive(Clone)]
pub struct ProgressSink {
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
    bytes_sent: Arc<AtomicU64>,
    total_bytes: u64,
}

impl ProgressSink {
    pub(crate) fn new(events: Option<mpsc::UnboundedSender<UploadEvent>>, total_bytes: u64) -> Self {
        Self {
            events,
            bytes_sent: Arc::new(AtomicU64::new(0)),
            total_bytes,
        }
    }

    pub fn report(&self, bytes_sent: u64) {
        self.bytes_sent.store(bytes_sent, Ordering::Relaxed);
        if let Some(events) = &self.events {
            let _ = events.send(UploadEvent::Progress {
                bytes_sent,
                total_bytes: self.total_bytes,
            });
        }
    }

    fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Moves one file to the server reliably.
pub struct UploadTransport {
    endpoint: Arc<dyn UploadEndpoint>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl UploadTransport {
    pub fn new(
        endpoint: Arc<dyn UploadEndpoint>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            endpoint,
            policy: config.retry,
            clock,
            config,
        }
    }

    /// Run one job to its terminal state.
    ///
    /// Progress and retry notifications stream on `events` while the job
    /// runs; exactly one `UploadEvent::Terminal` fires before this returns.
    pub async fn upload(
        &self,
        file: &Path,
        destination: &UploadDestination,
        events: Option<mpsc::UnboundedSender<UploadEvent>>,
        cancel: CancelToken,
    ) -> UploadReport {
        let mut report = UploadReport {
            file: file.to_path_buf(),
            state: JobState::Pending,
            retry_count: 0,
            bytes_sent: 0,
            total_bytes: 0,
            server_ids: Vec::new(),
            last_error: None,
        };

        // Gate the job before the first attempt: size bound and allow-list
        let total_bytes = match FileManager::get_file_info(file).await {
            Ok((size, _)) => size,
            Err(e) => {
                report.last_error = Some(format!("could not read file: {}", e));
                return self.finish(report, JobState::Failed, &events);
            }
        };
        report.total_bytes = total_bytes;
        if let Err(e) = FileManager::validate_upload(file, total_bytes, &self.config) {
            report.last_error = Some(e.to_string());
            return self.finish(report, JobState::Failed, &events);
        }

        let sink = ProgressSink::new(events.clone(), total_bytes);

        loop {
            if cancel.is_cancelled() {
                return self.finish(report, JobState::Cancelled, &events);
            }

            report.state = JobState::Uploading;
            debug!(
                "Uploading {} (attempt {})",
                file.display(),
                report.retry_count + 1
            );

            let context = AttemptContext {
                file,
                destination,
                progress: &sink,
                cancel: &cancel,
            };

            match self.endpoint.send(context).await {
                Ok(server_ids) => {
                    report.bytes_sent = sink.bytes_sent();
                    report.server_ids = server_ids;
                    info!(
                        "Upload succeeded for {} after {} retries",
                        file.display(),
                        report.retry_count
                    );
                    return self.finish(report, JobState::Succeeded, &events);
                }
                Err(UploadError::Cancelled) => {
                    report.bytes_sent = sink.bytes_sent();
                    return self.finish(report, JobState::Cancelled, &events);
                }
                Err(e) if e.is_retryable() && report.retry_count < self.policy.max_retries => {
                    let delay = self.policy.delay_for(report.retry_count);
                    report.retry_count += 1;
                    report.state = JobState::Retrying;
                    report.last_error = Some(e.user_message().to_string());
                    warn!(
                        "Upload attempt failed for {} ({}), retry {}/{} in {:?}",
                        file.display(),
                        e,
                        report.retry_count,
                        self.policy.max_retries,
                        delay
                    );
                    if let Some(events) = &events {
                        let _ = events.send(UploadEvent::Retrying {
                            attempt: report.retry_count,
                            delay,
                        });
                    }
                    self.clock.sleep(delay).await;
                    // A job cancelled during backoff is never retried
                    if cancel.is_cancelled() {
                        return self.finish(report, JobState::Cancelled, &events);
                    }
                }
                Err(e) => {
                    report.bytes_sent = sink.bytes_sent();
                    report.last_error = Some(e.user_message().to_string());
                    warn!("Upload failed for {}: {}", file.display(), e);
                    return self.finish(report, JobState::Failed, &events);
                }
            }
        }
    }

    /// Single exit point: every job emits its terminal event exactly once.
    fn finish(
        &self,
        mut report: UploadReport,
        state: JobState,
        events: &Option<mpsc::UnboundedSender<UploadEvent>>,
    ) -> UploadReport {
        report.state = state;
        if let Some(events) = events {
            let _ = events.send(UploadEvent::Terminal { state });
        }
        report
    }
}
