use crate::{
    MeasurementResult,
    Statistics,
};

/// Receives the results of a successful run.
///
/// Handed to the [`Runner`](crate::Runner) at construction. A failed run never reaches the sink.
pub trait TelemetrySink: Send + Sync {
    /// Records the four gauges of one round, tagged with the server identity and the round index.
    fn record_measurement(&self, result: &MeasurementResult);

    /// Records the aggregate of a run with more than one round.
    fn record_summary(&self, statistics: &Statistics);
}

/// Emits every observation as a structured event on the `speedster::metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsLog;

impl TelemetrySink for MetricsLog {
    fn record_measurement(&self, result: &MeasurementResult) {
        let server = &result.server;
        info!(
            target: "speedster::metrics",
            server_id = %server.id,
            server_name = %server.name,
            server_country = %server.country,
            measurement_index = result.measurement_index,
            speedtest_download_mbps = result.download_mbps,
            speedtest_upload_mbps = result.upload_mbps,
            speedtest_latency_ns = result.latency.as_nanos() as u64,
            speedtest_jitter_ns = result.jitter.as_nanos() as u64,
            "measurement"
        );
    }

    fn record_summary(&self, statistics: &Statistics) {
        let (download, upload) = (&statistics.download_mbps, &statistics.upload_mbps);
        info!(
            target: "speedster::metrics",
            download_mbps_mean = download.mean,
            download_mbps_min = download.min,
            download_mbps_max = download.max,
            upload_mbps_mean = upload.mean,
            upload_mbps_min = upload.min,
            upload_mbps_max = upload.max,
            "summary"
        );
    }
}
