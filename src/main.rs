use clap::Parser;
use color_eyre::Result;
use eyre::Context as _;
use speedster::{
    init_errors,
    init_logging,
    report,
    MetricsLog,
    Runner,
    Telemetry,
    TelemetrySink,
};
use speedster_config::{
    Args,
    Config,
};
use speedster_speedtest::{
    SpeedtestNet,
    TransferOptions,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;

    let args = Args::parse();
    let output_file = args.output_file.clone();
    let config = Config::new(args)?;

    let telemetry_config = config.telemetry();
    let telemetry = telemetry_config
        .enabled
        .then(|| Telemetry::init(&telemetry_config))
        .transpose()?;
    init_logging(telemetry.as_ref())?;
    debug!(?config, "Configuration loaded");

    let run_config = config.run_config()?;
    info!(?run_config, "Starting speed test");

    let tester = SpeedtestNet::new(TransferOptions {
        timeout: run_config.timeout,
        concurrent_streams: run_config.concurrent_streams,
        test_duration: run_config.test_duration,
    })?;
    let sink: Arc<dyn TelemetrySink> = match &telemetry {
        Some(telemetry) => Arc::new(telemetry.metrics()),
        None => Arc::new(MetricsLog),
    };
    let runner = Runner::new(run_config.clone(), Arc::new(tester), sink);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    let outcome = runner.run(&cancel).await.wrap_err("Speed test failed");
    if let Some(telemetry) = telemetry {
        shutdown_telemetry(telemetry).await;
    }
    let outcome = outcome?;

    report::log_results(&outcome);
    println!("{}", report::format(&run_config, &outcome));

    if let Some(path) = &output_file {
        let json = serde_json::to_string_pretty(&report::summary(&run_config, &outcome))?;
        std::fs::write(path, json).wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report exported");
    }

    info!("Speed test completed, exiting...");
    Ok(())
}

async fn shutdown_telemetry(telemetry: Telemetry) {
    match tokio::task::spawn_blocking(move || telemetry.shutdown()).await {
        Ok(Ok(())) => debug!("Telemetry flushed"),
        Ok(Err(err)) => warn!("Error during telemetry shutdown: {err:#}"),
        Err(err) => warn!("Telemetry shutdown task failed: {err}"),
    }
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Unable to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!("Unable to listen for Ctrl-C: {err}");
                return;
            }
        }
        _ = terminate => {}
    }

    info!("Received shutdown signal, cancelling the run...");
    cancel.cancel();
}
