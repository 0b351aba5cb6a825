#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod error;
mod strategy;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use app_config::get_config_dir;
pub use args::Args;
pub use error::ConfigError;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    time::Duration,
};
pub use strategy::{
    parse_server_ids,
    resolve,
    MeasurementStrategy,
    MeasurementStrategyIter,
    RunConfig,
    DEFAULT_TIMEOUT,
};

/// Raw configuration values, layered from the built-in defaults, config files and the command line.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server_id: String,
    pub measurement_count: usize,
    pub measurement_strategy: String,
    #[serde(default)]
    pub skip_download: bool,
    #[serde(default)]
    pub skip_upload: bool,
    pub timeout: String,
    #[serde(default)]
    pub concurrent_streams: usize,
    pub test_duration: String,
    #[serde(default)]
    pub otel_sdk_disabled: bool,
    pub otel_service_name: String,
    #[serde(default)]
    pub otel_service_namespace: String,
}

/// Where and under which identity metrics and traces are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
    pub service_namespace: Option<String>,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl config::Source for Config {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        cache.insert("server_id".to_string(), self.server_id.clone().into());
        cache.insert("measurement_count".to_string(), (self.measurement_count as u64).into());
        cache.insert(
            "measurement_strategy".to_string(),
            self.measurement_strategy.clone().into(),
        );
        cache.insert("skip_download".to_string(), self.skip_download.into());
        cache.insert("skip_upload".to_string(), self.skip_upload.into());
        cache.insert("timeout".to_string(), self.timeout.clone().into());
        cache.insert(
            "concurrent_streams".to_string(),
            (self.concurrent_streams as u64).into(),
        );
        cache.insert("test_duration".to_string(), self.test_duration.clone().into());
        cache.insert("otel_sdk_disabled".to_string(), self.otel_sdk_disabled.into());
        cache.insert("otel_service_name".to_string(), self.otel_service_name.clone().into());
        cache.insert(
            "otel_service_namespace".to_string(),
            self.otel_service_namespace.clone().into(),
        );
        Ok(cache)
    }
}

impl Config {
    /// Layers the defaults, `config.yaml` in the config directory, the file passed via `--config` and finally the
    /// command line and environment.
    pub fn new(args: Args) -> Result<Self, ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder().add_source(Config::default());

        let source = config::File::from(config_dir.join("config.yaml"))
            .format(config::FileFormat::Yaml)
            .required(false);
        builder = builder.add_source(source);

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml));
        }

        builder = builder.add_source(args);

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validates the raw values into a [`RunConfig`]. Fails before any network activity happens.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let resolved = resolve(
            &[self.server_id.as_str()],
            self.measurement_count,
            &self.measurement_strategy,
        )?;

        let test_duration = parse_duration("test_duration", &self.test_duration)?;

        Ok(RunConfig {
            skip_download: self.skip_download,
            skip_upload: self.skip_upload,
            timeout: parse_duration("timeout", &self.timeout)?,
            concurrent_streams: self.concurrent_streams,
            test_duration: (!test_duration.is_zero()).then_some(test_duration),
            ..resolved
        })
    }

    /// Identity and switch of the OTLP export.
    pub fn telemetry(&self) -> TelemetryConfig {
        let service_name = match self.otel_service_name.trim() {
            "" => "speedster",
            name => name,
        };
        let namespace = self.otel_service_namespace.trim();
        TelemetryConfig {
            enabled: !self.otel_sdk_disabled,
            service_name: service_name.to_string(),
            service_namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
        }
    }
}

/// Accepts humantime durations (`30s`, `1m 30s`) as well as a bare number of seconds.
pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(value).map_err(|_| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    })
}
