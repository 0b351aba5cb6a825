//! Fakes shared by the unit tests.

use crate::{
    MeasurementResult,
    Statistics,
    TelemetrySink,
};
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use speedster_speedtest::{
    NetworkError,
    PhaseSample,
    ServerHandle,
    SpeedTester,
};
use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Mutex,
    },
    time::Duration,
};
use url::Url;

pub(crate) fn server(id: &str, latency_ms: u64) -> ServerHandle {
    ServerHandle {
        id: id.to_string(),
        name: format!("Server {id}"),
        sponsor: "Example Carrier".to_string(),
        country: "Testland".to_string(),
        distance: 5.0,
        latency: Duration::from_millis(latency_ms),
        jitter: Duration::from_millis(1),
        url: Url::parse(&format!("http://{id}.example.net/speedtest/upload.php")).unwrap(),
    }
}

pub(crate) fn result(index: usize, download_mbps: f64, upload_mbps: f64) -> MeasurementResult {
    MeasurementResult {
        server: server("r", 10).info(),
        download_mbps,
        upload_mbps,
        latency: Duration::from_millis(10),
        jitter: Duration::from_millis(1),
        duration: Duration::from_secs(20),
        measurement_index: index,
    }
}

/// Serves a fixed catalog. The n-th download yields `100 * n` Mbps, the n-th upload `10 * n` Mbps.
#[derive(Default)]
pub(crate) struct FakeTester {
    catalog: Option<Vec<ServerHandle>>,
    fail_download_on: Option<usize>,
    hang_download_on: Option<usize>,
    phase_delay: Duration,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeTester {
    pub(crate) const DOWNLOAD_LATENCY: Duration = Duration::from_millis(12);
    pub(crate) const DOWNLOAD_JITTER: Duration = Duration::from_millis(3);
    pub(crate) const UPLOAD_LATENCY: Duration = Duration::from_millis(18);
    pub(crate) const UPLOAD_JITTER: Duration = Duration::from_millis(5);

    pub(crate) fn new(catalog: Vec<ServerHandle>) -> Self {
        Self {
            catalog: Some(catalog),
            ..Self::default()
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self::default()
    }

    /// The `call`-th download (1-based) fails.
    pub(crate) fn fail_download_on(mut self, call: usize) -> Self {
        self.fail_download_on = Some(call);
        self
    }

    /// The `call`-th download (1-based) never finishes.
    pub(crate) fn hang_download_on(mut self, call: usize) -> Self {
        self.hang_download_on = Some(call);
        self
    }

    /// Every phase takes `delay` before it reports.
    pub(crate) fn with_phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SpeedTester for FakeTester {
    fn fetch_catalog(&self) -> BoxFuture<'_, Result<Vec<ServerHandle>, NetworkError>> {
        self.record("catalog".to_string());
        let catalog = self
            .catalog
            .clone()
            .ok_or_else(|| NetworkError::Transfer("catalog unreachable".to_string()));
        async move { catalog }.boxed()
    }

    fn download_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>> {
        self.record(format!("download {}", server.id));
        let call = self.downloads.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if self.hang_download_on == Some(call) {
                futures::future::pending::<()>().await;
            }
            tokio::time::sleep(self.phase_delay).await;
            if self.fail_download_on == Some(call) {
                return Err(NetworkError::Transfer("connection reset by peer".to_string()));
            }
            Ok(PhaseSample {
                throughput_mbps: 100.0 * call as f64,
                latency: Self::DOWNLOAD_LATENCY,
                jitter: Self::DOWNLOAD_JITTER,
            })
        }
        .boxed()
    }

    fn upload_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>> {
        self.record(format!("upload {}", server.id));
        let call = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(self.phase_delay).await;
            Ok(PhaseSample {
                throughput_mbps: 10.0 * call as f64,
                latency: Self::UPLOAD_LATENCY,
                jitter: Self::UPLOAD_JITTER,
            })
        }
        .boxed()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    measurements: Mutex<Vec<MeasurementResult>>,
    summaries: Mutex<Vec<Statistics>>,
}

impl RecordingSink {
    pub(crate) fn measurements(&self) -> Vec<MeasurementResult> {
        self.measurements.lock().unwrap().clone()
    }

    pub(crate) fn summaries(&self) -> Vec<Statistics> {
        self.summaries.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn record_measurement(&self, result: &MeasurementResult) {
        self.measurements.lock().unwrap().push(result.clone());
    }

    fn record_summary(&self, statistics: &Statistics) {
        self.summaries.lock().unwrap().push(*statistics);
    }
}
