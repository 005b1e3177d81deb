//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` per il processing delle immagini (decode/encode)
//! - Definisce `UploadError` per il transport di upload, con classificazione
//!   retryable/non-retryable
//! - Fornisce messaggi user-facing classificati invece del testo interno
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `PipelineError::Decode`: fatale per l'asset, abortisce l'intero ProcessingResult
//! - `PipelineError::Encode`: per-cella, recuperabile (la cella viene omessa)
//! - `UploadError::Network/Timeout/RateLimited/Server`: retryable con backoff
//! - `UploadError::Client`: non-retryable, fallisce subito
//! - `UploadError::Cancelled`: terminale, mai ritentato

use std::path::PathBuf;

/// Errors raised while turning an original into its variant matrix.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The original could not be decoded. Fatal for the whole asset.
    #[error("Decode error: {0}")]
    Decode(String),

    /// One (size-class x format) cell failed to encode. Recoverable.
    #[error("Encode error for {size_class}/{format}: {reason}")]
    Encode {
        size_class: String,
        format: String,
        reason: String,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("File validation error: {0}")]
    Validation(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

/// Classified errors for the upload transport.
///
/// The classification drives the retry loop: `is_retryable()` errors are
/// retried with exponential backoff until the policy is exhausted, the rest
/// terminate the job immediately.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by server (429)")]
    RateLimited,

    #[error("Server error: HTTP {0}")]
    Server(u16),

    #[error("Client error: HTTP {0}")]
    Client(u16),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered 2xx but the body did not follow the
    /// `{success, data|error}` contract.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl UploadError {
    /// Whether a failed attempt with this error may be retried.
    ///
    /// 408 and 429 are mapped to `Timeout` and `RateLimited` before this is
    /// consulted, so `Client` only ever carries non-retryable statuses.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Network(_)
                | UploadError::Timeout
                | UploadError::RateLimited
                | UploadError::Server(_)
        )
    }

    /// Short classified message for the UI, never raw internal error text.
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::Network(_) => "network problem",
            UploadError::Timeout => "request timed out",
            UploadError::RateLimited => "server is busy, slowing down",
            UploadError::Server(_) => "server error",
            UploadError::Client(_) => "request rejected",
            UploadError::Cancelled => "upload cancelled",
            UploadError::Io(_) => "could not read file",
            UploadError::Protocol(_) => "unexpected server response",
        }
    }

    /// Classify an HTTP status code from the upload endpoint.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 => UploadError::Timeout,
            429 => UploadError::RateLimited,
            500..=599 => UploadError::Server(status),
            _ => UploadError::Client(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(UploadError::Network("connection reset".into()).is_retryable());
        assert!(UploadError::Timeout.is_retryable());
        assert!(UploadError::RateLimited.is_retryable());
        assert!(UploadError::Server(503).is_retryable());

        assert!(!UploadError::Client(404).is_retryable());
        assert!(!UploadError::Cancelled.is_retryable());
        assert!(!UploadError::Protocol("bad body".into()).is_retryable());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(UploadError::from_status(408), UploadError::Timeout));
        assert!(matches!(UploadError::from_status(429), UploadError::RateLimited));
        assert!(matches!(UploadError::from_status(503), UploadError::Server(503)));
        assert!(matches!(UploadError::from_status(403), UploadError::Client(403)));
    }

    #[test]
    fn test_user_messages_are_classified() {
        // User-visible text must not leak the internal error detail
        let err = UploadError::Network("tcp connect error: 10.0.0.1:443".into());
        assert_eq!(err.user_message(), "network problem");
        assert!(!err.user_message().contains("10.0.0.1"));
    }
}
