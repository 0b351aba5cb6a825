use crate::Telemetry;
use color_eyre::Result;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Installs the `color-eyre` report and panic handlers.
pub fn init_errors() -> Result<()> {
    color_eyre::install()
}

/// Logs to stderr, filtered by `RUST_LOG` and defaulting to `info`. Spans are kept for error reports and, with
/// `telemetry`, exported over OTLP.
pub fn init_logging(telemetry: Option<&Telemetry>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(telemetry.map(|telemetry| telemetry.layer()))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
