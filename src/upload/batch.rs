//! # Batch Upload Coordinator Module
//!
//! Questo modulo orchestra l'upload di più file: strettamente sequenziale,
//! un job alla volta, con una pausa fissa tra un job e il successivo per
//! non saturare il server.
//!
//! ## Responsabilità:
//! - Esegue i job in ordine, mai in parallelo
//! - Applica `inter_job_delay` tra la fine di un job e l'inizio del prossimo
//! - Continua con il job successivo anche dopo Failed o Cancelled
//! - Alla cancellazione del batch, i job non ancora iniziati terminano
//!   Cancelled senza alcun tentativo di rete
//! - Restituisce un report terminale per ogni job, indicizzato come l'input

use crate::config::Config;
use crate::upload::clock::Clock;
use crate::upload::endpoint::UploadEndpoint;
use crate::upload::transport::{
    CancelToken, JobState, UploadDestination, UploadEvent, UploadReport, UploadTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Runs a list of upload jobs sequentially.
pub struct BatchUploadCoordinator {
    transport: UploadTransport,
    clock: Arc<dyn Clock>,
    inter_job_delay: Duration,
}

impl BatchUploadCoordinator {
    pub fn new(
        endpoint: Arc<dyn UploadEndpoint>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let inter_job_delay = Duration::from_millis(config.inter_job_delay_ms);
        Self {
            transport: UploadTransport::new(endpoint, Arc::clone(&clock), config),
            clock,
            inter_job_delay,
        }
    }

    /// Upload every file in order. The returned vector has one terminal
    /// report per input file, at the same index.
    pub async fn run(
        &self,
        files: &[PathBuf],
        destination: &UploadDestination,
        events: Option<mpsc::UnboundedSender<UploadEvent>>,
        cancel: CancelToken,
    ) -> Vec<UploadReport> {
        let mut reports = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            // Jobs not yet started when the batch is cancelled never
            // touch the network
            if cancel.is_cancelled() {
                reports.push(Self::cancelled_without_attempt(file.clone(), &events));
                continue;
            }

            if index > 0 && !self.inter_job_delay.is_zero() {
                self.clock.sleep(self.inter_job_delay).await;
            }
            if cancel.is_cancelled() {
                reports.push(Self::cancelled_without_attempt(file.clone(), &events));
                continue;
            }

            info!("Starting upload {}/{}: {}", index + 1, files.len(), file.display());
            let report = self
                .transport
                .upload(file, destination, events.clone(), cancel.clone())
                .await;
            reports.push(report);
        }

        let succeeded = reports
            .iter()
            .filter(|r| r.state == JobState::Succeeded)
            .count();
        info!("Batch finished: {}/{} uploads succeeded", succeeded, files.len());

        reports
    }

    fn cancelled_without_attempt(
        file: PathBuf,
        events: &Option<mpsc::UnboundedSender<UploadEvent>>,
    ) -> UploadReport {
        if let Some(events) = events {
            let _ = events.send(UploadEvent::Terminal {
                state: JobState::Cancelled,
            });
        }
        UploadReport {
            file,
            state: JobState::Cancelled,
            retry_count: 0,
            bytes_sent: 0,
            total_bytes: 0,
            server_ids: Vec::new(),
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::upload::clock::testing::ManualClock;
    use crate::upload::endpoint::testing::ScriptedEndpoint;
    use crate::upload::endpoint::AttemptContext;
    use crate::upload::transport::cancellation_channel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    fn destination() -> UploadDestination {
        UploadDestination {
            endpoint: "https://cms.example.com/api/upload".to_string(),
            category: "gallery".to_string(),
        }
    }

    fn write_files(dir: &TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("photo_{}.jpg", i));
                std::fs::write(&path, vec![0u8; 1024]).unwrap();
                path
            })
            .collect()
    }

    fn coordinator(
        endpoint: ScriptedEndpoint,
        clock: ManualClock,
        dir: &TempDir,
    ) -> BatchUploadCoordinator {
        let config = Config {
            media_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        BatchUploadCoordinator::new(Arc::new(endpoint), Arc::new(clock), config)
    }

    #[tokio::test]
    async fn test_jobs_run_in_order_with_one_report_each() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 3);

        let endpoint = ScriptedEndpoint::new(vec![
            Ok(vec!["id-0".to_string()]),
            Ok(vec!["id-1".to_string()]),
            Ok(vec!["id-2".to_string()]),
        ]);
        let coordinator = coordinator(endpoint, ManualClock::new(), &dir);

        let reports = coordinator
            .run(&files, &destination(), None, CancelToken::unstoppable())
            .await;

        assert_eq!(reports.len(), 3);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.file, files[i]);
            assert_eq!(report.state, JobState::Succeeded);
            assert_eq!(report.server_ids, vec![format!("id-{}", i)]);
        }
    }

    #[tokio::test]
    async fn test_inter_job_delay_between_consecutive_jobs() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 3);

        let endpoint = ScriptedEndpoint::new(vec![Ok(vec![]), Ok(vec![]), Ok(vec![])]);
        let clock = ManualClock::new();
        let coordinator = coordinator(endpoint, clock.clone(), &dir);

        coordinator
            .run(&files, &destination(), None, CancelToken::unstoppable())
            .await;

        // Two gaps for three jobs, none before the first; no retries
        // happened so every recorded sleep is an inter-job pause
        assert_eq!(
            clock.slept(),
            vec![Duration::from_millis(500), Duration::from_millis(500)]
        );
    }

    #[tokio::test]
    async fn test_batch_continues_after_a_failed_job() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 2);

        let endpoint = ScriptedEndpoint::new(vec![
            Err(UploadError::Client(400)),
            Ok(vec!["id-1".to_string()]),
        ]);
        let attempts = endpoint.attempt_counter();
        let coordinator = coordinator(endpoint, ManualClock::new(), &dir);

        let reports = coordinator
            .run(&files, &destination(), None, CancelToken::unstoppable())
            .await;

        assert_eq!(reports[0].state, JobState::Failed);
        assert_eq!(reports[1].state, JobState::Succeeded);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_unstarted_jobs() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 3);

        let (sender, token) = cancellation_channel();
        sender.send(()).unwrap();

        let endpoint = ScriptedEndpoint::always(UploadError::Network("unused".into()));
        let attempts = endpoint.attempt_counter();
        let coordinator = coordinator(endpoint, ManualClock::new(), &dir);

        let reports = coordinator.run(&files, &destination(), None, token).await;

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.state == JobState::Cancelled));
        assert_eq!(attempts.load(Ordering::Relaxed), 0);
    }

    /// Endpoint that cancels the batch while serving the first attempt.
    struct CancellingEndpoint {
        sender: broadcast::Sender<()>,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl UploadEndpoint for CancellingEndpoint {
        async fn send(&self, _context: AttemptContext<'_>) -> Result<Vec<String>, UploadError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let _ = self.sender.send(());
            Ok(vec!["id-0".to_string()])
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_finishes_current_job_then_stops() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 3);

        let (sender, token) = cancellation_channel();
        let endpoint = Arc::new(CancellingEndpoint {
            sender,
            attempts: AtomicU32::new(0),
        });
        let config = Config {
            media_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let coordinator =
            BatchUploadCoordinator::new(endpoint.clone(), Arc::new(ManualClock::new()), config);

        let reports = coordinator.run(&files, &destination(), None, token).await;

        // The in-flight job ran to completion, the rest never started
        assert_eq!(reports[0].state, JobState::Succeeded);
        assert_eq!(reports[1].state, JobState::Cancelled);
        assert_eq!(reports[2].state, JobState::Cancelled);
        assert_eq!(endpoint.attempts.load(Ordering::Relaxed), 1);
    }
}
