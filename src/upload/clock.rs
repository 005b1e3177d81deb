//! # Clock Abstraction Module
//!
//! Il tempo è iniettato nel transport e nel batch coordinator invece di
//! essere globale: i test controllano i delay di backoff in modo
//! deterministico senza dormire davvero.

use async_trait::async_trait;
use std::time::Duration;

/// Injected time source for backoff sleeps and inter-job pacing.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Default, Clone)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock that records requested sleeps and returns immediately.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    pub struct ManualClock {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every sleep requested so far, in order.
        pub fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }
}
