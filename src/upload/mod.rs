//! # Upload Subsystem
//!
//! Trasporto resiliente dei media verso il server: retry con backoff
//! esponenziale, cancellazione cooperativa, batch sequenziale.
//!
//! ## Architettura:
//! - `clock`: sorgente di tempo iniettata (backoff e pacing deterministici nei test)
//! - `endpoint`: il singolo tentativo HTTP dietro un trait
//! - `transport`: state machine del job e loop di retry
//! - `batch`: orchestrazione sequenziale di più job

pub mod batch;
pub mod clock;
pub mod endpoint;
pub mod transport;

pub use batch::BatchUploadCoordinator;
pub use clock::{Clock, TokioClock};
pub use endpoint::{HttpEndpoint, UploadEndpoint};
pub use transport::{
    cancellation_channel, CancelToken, JobState, UploadDestination, UploadEvent, UploadReport,
    UploadTransport,
};
