use crate::{
    NetworkError,
    ServerHandle,
};
use futures::future::BoxFuture;
use std::time::Duration;

/// Parallel streams used when none are configured.
pub const DEFAULT_CONCURRENT_STREAMS: usize = 4;
/// Phase length used when none is configured.
pub const DEFAULT_TEST_DURATION: Duration = Duration::from_secs(10);

/// Outcome of a single download or upload phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSample {
    pub throughput_mbps: f64,
    pub latency: Duration,
    pub jitter: Duration,
}

/// Knobs of the measurement primitive. Opaque to the orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub timeout: Duration,
    /// Zero picks [`DEFAULT_CONCURRENT_STREAMS`].
    pub concurrent_streams: usize,
    /// `None` picks [`DEFAULT_TEST_DURATION`].
    pub test_duration: Option<Duration>,
}

impl TransferOptions {
    pub fn streams(&self) -> usize {
        match self.concurrent_streams {
            0 => DEFAULT_CONCURRENT_STREAMS,
            n => n,
        }
    }

    pub fn test_duration(&self) -> Duration {
        self.test_duration.unwrap_or(DEFAULT_TEST_DURATION)
    }
}

/// The network measurement primitive.
///
/// Every operation may block on the network for a long time. Dropping the returned future aborts the operation,
/// which is how callers cancel it.
pub trait SpeedTester: Send + Sync {
    /// Fetch the candidate servers together with their latency estimates.
    fn fetch_catalog(&self) -> BoxFuture<'_, Result<Vec<ServerHandle>, NetworkError>>;

    /// Measure download throughput against `server`.
    fn download_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>>;

    /// Measure upload throughput against `server`.
    fn upload_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>>;
}
