//! # Upload Endpoint Module
//!
//! Questo modulo isola il singolo tentativo HTTP dietro il trait
//! `UploadEndpoint`: il transport vede solo "un tentativo, un risultato
//! classificato" e resta testabile senza rete.
//!
//! ## Responsabilità:
//! - Definisce il contratto di un singolo tentativo di upload
//! - Implementa `HttpEndpoint` con reqwest (multipart, streaming a chunk)
//! - Emette progresso byte-level per ogni chunk inviato
//! - Interrompe il body stream quando il token di cancellazione scatta
//! - Parsa la risposta `{success, data|error}` del server

use crate::error::UploadError;
use crate::file_manager::FileManager;
use crate::upload::transport::{CancelToken, ProgressSink, UploadDestination};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Bytes per body chunk; each sent chunk produces one progress event.
const CHUNK_SIZE: usize = 64 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything one attempt needs, borrowed from the transport loop.
pub struct AttemptContext<'a> {
    pub file: &'a Path,
    pub destination: &'a UploadDestination,
    pub progress: &'a ProgressSink,
    pub cancel: &'a CancelToken,
}

/// One upload attempt against the server.
///
/// Implementations classify every failure as an `UploadError`; the retry
/// decision belongs to the transport, never to the endpoint.
#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    /// Perform a single attempt. On success returns the server-assigned
    /// asset ids from the response body.
    async fn send(&self, context: AttemptContext<'_>) -> Result<Vec<String>, UploadError>;
}

/// Response contract of the upload endpoint.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(default)]
    ids: Vec<String>,
}

/// Production endpoint speaking multipart/form-data over reqwest.
pub struct HttpEndpoint {
    client: reqwest::Client,
}

impl HttpEndpoint {
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Map a reqwest transport failure onto the classified error space.
    fn classify(error: reqwest::Error, cancel: &CancelToken) -> UploadError {
        // A body stream aborted by cancellation surfaces as a generic
        // request error; the latched token disambiguates it
        if cancel.is_cancelled() {
            return UploadError::Cancelled;
        }
        if error.is_timeout() {
            return UploadError::Timeout;
        }
        UploadError::Network(error.to_string())
    }

    /// Body stream over fixed-size chunks, reporting progress per chunk
    /// and failing fast once cancellation is observed.
    fn chunk_stream(
        bytes: Vec<u8>,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
        let chunks: Vec<Bytes> = bytes
            .chunks(CHUNK_SIZE)
            .map(Bytes::copy_from_slice)
            .collect();

        let mut sent: u64 = 0;
        futures::stream::iter(chunks).map(move |chunk| {
            if cancel.is_cancelled() {
                return Err(std::io::Error::other("upload cancelled"));
            }
            sent += chunk.len() as u64;
            progress.report(sent);
            Ok::<Bytes, std::io::Error>(chunk)
        })
    }

    fn chunked_body(bytes: Vec<u8>, progress: ProgressSink, cancel: CancelToken) -> reqwest::Body {
        reqwest::Body::wrap_stream(Self::chunk_stream(bytes, progress, cancel))
    }
}

#[async_trait]
impl UploadEndpoint for HttpEndpoint {
    async fn send(&self, context: AttemptContext<'_>) -> Result<Vec<String>, UploadError> {
        let bytes = tokio::fs::read(context.file).await?;
        let total = bytes.len() as u64;

        let filename = context
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = FileManager::mime_for(context.file)
            .ok_or_else(|| UploadError::Protocol("unknown media type".to_string()))?;

        let body = Self::chunked_body(
            bytes,
            context.progress.clone(),
            context.cancel.clone(),
        );
        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(filename)
            .mime_str(mime)
            .map_err(|e| UploadError::Protocol(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("category", context.destination.category.clone());

        debug!(
            "POST {} ({} bytes, category {})",
            context.destination.endpoint,
            total,
            context.destination.category
        );

        let response = self
            .client
            .post(&context.destination.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::classify(e, context.cancel))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::from_status(status.as_u16()));
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Protocol(e.to_string()))?;

        if api.success {
            Ok(api.data.map(|d| d.ids).unwrap_or_default())
        } else {
            Err(UploadError::Protocol(
                api.error.unwrap_or_else(|| "server reported failure".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::transport::{cancellation_channel, ProgressSink, UploadEvent};
    use futures::StreamExt;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_body_stream_emits_ascending_progress_per_chunk() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        // Three full 64 KiB chunks plus an 8 KiB remainder
        let total = 200 * 1024u64;
        let sink = ProgressSink::new(Some(events_tx), total);
        let mut stream = Box::pin(HttpEndpoint::chunk_stream(
            vec![7u8; total as usize],
            sink,
            CancelToken::unstoppable(),
        ));

        let mut drained = 0u64;
        while let Some(chunk) = stream.next().await {
            drained += chunk.unwrap().len() as u64;
        }
        assert_eq!(drained, total);

        let mut reported = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            if let UploadEvent::Progress {
                bytes_sent,
                total_bytes,
            } = event
            {
                assert_eq!(total_bytes, total);
                reported.push(bytes_sent);
            }
        }

        // One cumulative event per chunk, strictly ascending to the total
        assert_eq!(reported, vec![65_536, 131_072, 196_608, 204_800]);
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_the_body_stream() {
        let (sender, token) = cancellation_channel();
        let sink = ProgressSink::new(None, (3 * CHUNK_SIZE) as u64);
        let mut stream = Box::pin(HttpEndpoint::chunk_stream(
            vec![0u8; 3 * CHUNK_SIZE],
            sink,
            token,
        ));

        // First chunk flows normally
        let first = stream.next().await.unwrap();
        assert_eq!(first.unwrap().len(), CHUNK_SIZE);

        sender.send(()).unwrap();

        // The next poll errors instead of yielding more bytes
        let second = stream.next().await.unwrap();
        assert!(second.is_err());
    }
}

/// Scripted endpoint for deterministic transport and batch tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    type Attempt = Result<Vec<String>, UploadError>;

    pub struct ScriptedEndpoint {
        script: Mutex<VecDeque<Attempt>>,
        repeated: Option<UploadError>,
        attempts: Arc<AtomicU32>,
    }

    impl ScriptedEndpoint {
        /// Answer each attempt with the next scripted result, in order.
        pub fn new(script: Vec<Attempt>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                repeated: None,
                attempts: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Answer every attempt with (a copy of) the same error.
        pub fn always(error: UploadError) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                repeated: Some(error),
                attempts: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Shared counter of attempts made so far.
        pub fn attempt_counter(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.attempts)
        }

        fn copy_error(error: &UploadError) -> UploadError {
            match error {
                UploadError::Network(s) => UploadError::Network(s.clone()),
                UploadError::Timeout => UploadError::Timeout,
                UploadError::RateLimited => UploadError::RateLimited,
                UploadError::Server(s) => UploadError::Server(*s),
                UploadError::Client(s) => UploadError::Client(*s),
                UploadError::Cancelled => UploadError::Cancelled,
                UploadError::Io(e) => {
                    UploadError::Io(std::io::Error::new(e.kind(), e.to_string()))
                }
                UploadError::Protocol(s) => UploadError::Protocol(s.clone()),
            }
        }
    }

    #[async_trait]
    impl UploadEndpoint for ScriptedEndpoint {
        async fn send(&self, _context: AttemptContext<'_>) -> Result<Vec<String>, UploadError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            if let Some(step) = self.script.lock().unwrap().pop_front() {
                return step;
            }
            match &self.repeated {
                Some(error) => Err(Self::copy_error(error)),
                None => panic!("scripted endpoint ran out of steps"),
            }
        }
    }
}
