use crate::{
    selector::select,
    summarize,
    MeasurementError,
    RunError,
    Stage,
    Statistics,
    TelemetrySink,
};
use chrono::{
    DateTime,
    Utc,
};
use speedster_config::RunConfig;
use speedster_speedtest::{
    PhaseSample,
    ServerHandle,
    ServerInfo,
    SpeedTester,
};
use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{
    field,
    Instrument as _,
    Span,
};

macro_rules! phase_span {
    ($name:literal, $server:ident) => {
        info_span!(
            $name,
            server.id = %$server.id,
            server.name = %$server.name,
            mbps = field::Empty,
            latency_nanos = field::Empty,
            jitter_nanos = field::Empty
        )
    };
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Download,
    Upload,
}

impl From<Phase> for Stage {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Download => Stage::Download,
            Phase::Upload => Stage::Upload,
        }
    }
}

/// The outcome of one round.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub server: ServerInfo,
    /// 0.0 when the download phase was skipped.
    pub download_mbps: f64,
    /// 0.0 when the upload phase was skipped.
    pub upload_mbps: f64,
    pub latency: Duration,
    pub jitter: Duration,
    /// Wall clock time of the round including both phases.
    pub duration: Duration,
    /// 1-based, in execution order.
    pub measurement_index: usize,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub started_at: DateTime<Utc>,
    pub results: Vec<MeasurementResult>,
    /// Only present for runs with more than one round.
    pub statistics: Option<Statistics>,
}

/// Drives the measurement rounds of one run, one after another.
pub struct Runner {
    config: RunConfig,
    tester: Arc<dyn SpeedTester>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Runner {
    pub fn new(config: RunConfig, tester: Arc<dyn SpeedTester>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config,
            tester,
            telemetry,
        }
    }

    /// Selects the servers and runs every round.
    ///
    /// The first failure aborts the run. Cancelling `cancel` aborts the operation in flight. In both cases no result
    /// is handed to the telemetry sink.
    #[instrument(
        name = "speedtest.execution",
        skip_all,
        err(Display),
        fields(
            measurement_count = self.config.measurement_count,
            measurement_strategy = %self.config.strategy
        )
    )]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunOutcome, RunError> {
        let started_at = Utc::now();
        let servers = self.select_servers(cancel).await?;

        let mut results = Vec::with_capacity(servers.len());
        for (round, server) in servers.iter().enumerate() {
            results.push(self.measure(round + 1, server, cancel).await?);
        }

        let statistics = (self.config.measurement_count > 1).then(|| summarize(&results));

        for result in &results {
            self.telemetry.record_measurement(result);
        }
        if let Some(statistics) = &statistics {
            self.telemetry.record_summary(statistics);
        }

        info!(rounds = results.len(), "Speed test completed successfully");

        Ok(RunOutcome {
            started_at,
            results,
            statistics,
        })
    }

    #[instrument(
        name = "speedtest.server_selection",
        skip_all,
        fields(catalog_size = field::Empty, strategy = %self.config.strategy)
    )]
    async fn select_servers(&self, cancel: &CancellationToken) -> Result<Vec<ServerHandle>, RunError> {
        let catalog = cancellable(cancel, Stage::Catalog, self.tester.fetch_catalog())
            .await?
            .map_err(RunError::Catalog)?;
        Span::current().record("catalog_size", catalog.len());

        Ok(select(
            &catalog,
            &self.config.server_ids,
            self.config.strategy,
            self.config.measurement_count,
        )?)
    }

    #[instrument(
        name = "speedtest.measurement",
        skip_all,
        fields(
            measurement_index = index,
            speedtest.server.id = %server.id,
            speedtest.server.name = %server.name,
            speedtest.server.country = %server.country,
            speedtest.server.distance = server.distance,
            speedtest.download.mbps = field::Empty,
            speedtest.upload.mbps = field::Empty
        )
    )]
    async fn measure(
        &self,
        index: usize,
        server: &ServerHandle,
        cancel: &CancellationToken,
    ) -> Result<MeasurementResult, RunError> {
        let started = Instant::now();
        let mut download_mbps = 0.0;
        let mut upload_mbps = 0.0;
        // Latency and jitter come from whichever phase ran last.
        let mut latest = None;

        if !self.config.skip_download {
            let sample = self.phase(Phase::Download, index, server, cancel).await?;
            download_mbps = sample.throughput_mbps;
            Span::current().record("speedtest.download.mbps", download_mbps);
            latest = Some(sample);
        }

        if !self.config.skip_upload {
            let sample = self.phase(Phase::Upload, index, server, cancel).await?;
            upload_mbps = sample.throughput_mbps;
            Span::current().record("speedtest.upload.mbps", upload_mbps);
            latest = Some(sample);
        }

        let (latency, jitter) = match latest {
            Some(sample) => (sample.latency, sample.jitter),
            None => (server.latency, server.jitter),
        };

        Ok(MeasurementResult {
            server: server.info(),
            download_mbps,
            upload_mbps,
            latency,
            jitter,
            duration: started.elapsed(),
            measurement_index: index,
        })
    }

    async fn phase(
        &self,
        phase: Phase,
        index: usize,
        server: &ServerHandle,
        cancel: &CancellationToken,
    ) -> Result<PhaseSample, RunError> {
        let stage = Stage::from(phase);
        let (span, transfer) = match phase {
            Phase::Download => (
                phase_span!("speedtest.download_test", server),
                self.tester.download_test(server),
            ),
            Phase::Upload => (phase_span!("speedtest.upload_test", server), self.tester.upload_test(server)),
        };

        async move {
            let sample = cancellable(cancel, stage, transfer)
                .await?
                .map_err(|source| RunError::Phase { stage, index, source })?;

            let span = Span::current();
            span.record("mbps", sample.throughput_mbps);
            span.record("latency_nanos", sample.latency.as_nanos() as u64);
            span.record("jitter_nanos", sample.jitter.as_nanos() as u64);
            Ok::<_, RunError>(sample)
        }
        .instrument(span)
        .await
    }
}

/// Races `operation` against `cancel`. A cancelled operation is dropped, which aborts it.
async fn cancellable<T>(
    cancel: &CancellationToken,
    stage: Stage,
    operation: impl Future<Output = T>,
) -> Result<T, MeasurementError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(%stage, "Cancelled");
            Err(MeasurementError::Cancelled { stage })
        }
        output = operation => Ok(output),
    }
}
