use crate::{
    MeasurementResult,
    Statistics,
    TelemetrySink,
};
use color_eyre::Result;
use opentelemetry::{
    metrics::{
        Gauge,
        Meter,
        MeterProvider as _,
    },
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::{
    MetricExporter,
    SpanExporter,
};
use opentelemetry_sdk::{
    metrics::{
        PeriodicReader,
        SdkMeterProvider,
    },
    trace::{
        Sampler,
        SdkTracerProvider,
    },
    Resource,
};
use speedster_config::TelemetryConfig;
use std::time::Duration;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter,
    registry::LookupSpan,
    Layer,
};

const SCOPE: &str = "speedster";
const EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// OTLP/HTTP metric and trace pipelines. The endpoint comes from the standard `OTEL_EXPORTER_OTLP_*` variables.
pub struct Telemetry {
    meter_provider: SdkMeterProvider,
    tracer_provider: SdkTracerProvider,
}

impl Telemetry {
    pub fn init(config: &TelemetryConfig) -> Result<Self> {
        let resource = resource(config);

        let metric_exporter = MetricExporter::builder().with_http().build()?;
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(
                PeriodicReader::builder(metric_exporter)
                    .with_interval(EXPORT_INTERVAL)
                    .build(),
            )
            .build();

        let span_exporter = SpanExporter::builder().with_http().build()?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_sampler(Sampler::AlwaysOn)
            .with_batch_exporter(span_exporter)
            .build();

        Ok(Self {
            meter_provider,
            tracer_provider,
        })
    }

    pub fn metrics(&self) -> OtlpMetrics {
        OtlpMetrics::new(&self.meter_provider.meter(SCOPE))
    }

    /// Exports the `tracing` span tree.
    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        tracing_opentelemetry::layer()
            .with_tracer(self.tracer_provider.tracer(SCOPE))
            .with_filter(LevelFilter::INFO)
    }

    /// Flushes whatever is still buffered. Blocks until the exporters are done.
    pub fn shutdown(self) -> Result<()> {
        let metrics = self.meter_provider.shutdown();
        let traces = self.tracer_provider.shutdown();
        metrics?;
        traces?;
        Ok(())
    }
}

fn resource(config: &TelemetryConfig) -> Resource {
    let builder = Resource::builder().with_service_name(config.service_name.clone());
    match &config.service_namespace {
        Some(namespace) => builder.with_attribute(KeyValue::new("service.namespace", namespace.clone())),
        None => builder,
    }
    .build()
}

/// Records the four gauges of every round through an OpenTelemetry meter.
#[derive(Clone)]
pub struct OtlpMetrics {
    download: Gauge<f64>,
    upload: Gauge<f64>,
    latency: Gauge<u64>,
    jitter: Gauge<u64>,
}

impl OtlpMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            download: meter
                .f64_gauge("speedtest_download_mbps")
                .with_description("Download speed in Mbps")
                .with_unit("Mbps")
                .build(),
            upload: meter
                .f64_gauge("speedtest_upload_mbps")
                .with_description("Upload speed in Mbps")
                .with_unit("Mbps")
                .build(),
            latency: meter
                .u64_gauge("speedtest_latency_ns")
                .with_description("Latency in nanoseconds")
                .with_unit("ns")
                .build(),
            jitter: meter
                .u64_gauge("speedtest_jitter_ns")
                .with_description("Jitter in nanoseconds")
                .with_unit("ns")
                .build(),
        }
    }
}

impl TelemetrySink for OtlpMetrics {
    fn record_measurement(&self, result: &MeasurementResult) {
        let attributes = attributes(result);
        self.download.record(result.download_mbps, &attributes);
        self.upload.record(result.upload_mbps, &attributes);
        self.latency.record(result.latency.as_nanos() as u64, &attributes);
        self.jitter.record(result.jitter.as_nanos() as u64, &attributes);
    }

    // Only the per-round gauges are exported.
    fn record_summary(&self, statistics: &Statistics) {
        debug!(?statistics, "Summary not exported");
    }
}

fn attributes(result: &MeasurementResult) -> [KeyValue; 4] {
    let server = &result.server;
    [
        KeyValue::new("server_id", server.id.clone()),
        KeyValue::new("server_name", server.name.clone()),
        KeyValue::new("server_country", server.country.clone()),
        KeyValue::new("measurement_index", result.measurement_index as i64),
    ]
}
