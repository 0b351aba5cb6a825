use clap::{
    builder::BoolishValueParser,
    Parser,
};
use std::path::PathBuf;

/// Measure internet bandwidth and latency against speedtest servers.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Comma-separated server IDs to pin. Empty picks servers by latency.
    #[arg(long = "server-id", env = "SPEEDTEST_SERVER_ID", value_name = "IDS")]
    pub server_id: Option<String>,

    /// Number of independent measurement rounds.
    #[arg(long, env = "SPEEDTEST_MEASUREMENT_COUNT")]
    pub measurement_count: Option<usize>,

    /// `single-server` or `multi-server`. Unknown values fall back to `single-server`.
    #[arg(long, env = "SPEEDTEST_MEASUREMENT_STRATEGY", value_name = "STRATEGY")]
    pub measurement_strategy: Option<String>,

    /// Skip the download phase of every round.
    #[arg(long, env = "SPEEDTEST_SKIP_DOWNLOAD", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub skip_download: Option<bool>,

    /// Skip the upload phase of every round.
    #[arg(long, env = "SPEEDTEST_SKIP_UPLOAD", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub skip_upload: Option<bool>,

    /// Per-request timeout, e.g. `30s` or `45`.
    #[arg(long, env = "SPEEDTEST_TIMEOUT", value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Parallel transfer streams per phase. 0 uses the default.
    #[arg(long, env = "SPEEDTEST_CONCURRENT_STREAMS")]
    pub concurrent_streams: Option<usize>,

    /// How long each phase transfers data. 0 uses the default.
    #[arg(long, env = "SPEEDTEST_TEST_DURATION", value_name = "DURATION")]
    pub test_duration: Option<String>,

    /// Disable the OTLP export of metrics and traces.
    #[arg(long, env = "OTEL_SDK_DISABLED", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub otel_sdk_disabled: Option<bool>,

    /// `service.name` of the exported telemetry.
    #[arg(long, env = "OTEL_SERVICE_NAME", value_name = "NAME")]
    pub otel_service_name: Option<String>,

    /// `service.namespace` of the exported telemetry. Empty leaves it unset.
    #[arg(long, env = "OTEL_SERVICE_NAMESPACE", value_name = "NAMESPACE")]
    pub otel_service_namespace: Option<String>,

    /// Additional YAML config file, applied on top of the one in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Export the run report as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(server_id) = &self.server_id {
                cache.insert("server_id".to_string(), server_id.clone().into());
            }
            if let Some(count) = self.measurement_count {
                cache.insert("measurement_count".to_string(), (count as u64).into());
            }
            if let Some(strategy) = &self.measurement_strategy {
                cache.insert("measurement_strategy".to_string(), strategy.clone().into());
            }
            if let Some(skip) = self.skip_download {
                cache.insert("skip_download".to_string(), skip.into());
            }
            if let Some(skip) = self.skip_upload {
                cache.insert("skip_upload".to_string(), skip.into());
            }
            if let Some(timeout) = &self.timeout {
                cache.insert("timeout".to_string(), timeout.clone().into());
            }
            if let Some(streams) = self.concurrent_streams {
                cache.insert("concurrent_streams".to_string(), (streams as u64).into());
            }
            if let Some(duration) = &self.test_duration {
                cache.insert("test_duration".to_string(), duration.clone().into());
            }
            if let Some(disabled) = self.otel_sdk_disabled {
                cache.insert("otel_sdk_disabled".to_string(), disabled.into());
            }
            if let Some(name) = &self.otel_service_name {
                cache.insert("otel_service_name".to_string(), name.clone().into());
            }
            if let Some(namespace) = &self.otel_service_namespace {
                cache.insert("otel_service_namespace".to_string(), namespace.clone().into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "{}

Authors: {author}
Config directory: {config_dir_path}",
        clap::crate_version!()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Source as _;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "speedster",
            "--server-id",
            "1,2",
            "--measurement-count",
            "2",
            "--measurement-strategy",
            "multi-server",
            "--skip-upload",
            "true",
        ])
        .unwrap();

        assert_eq!(args.server_id.as_deref(), Some("1,2"));
        assert_eq!(args.measurement_count, Some(2));
        assert_eq!(args.skip_upload, Some(true));
        assert_eq!(args.skip_download, None);
    }

    #[test]
    fn only_given_values_become_overrides() {
        let args = Args {
            measurement_count: Some(3),
            ..Args::default()
        };
        let collected = args.collect().unwrap();
        assert_eq!(collected.len(), 1);
        assert!(collected.contains_key("measurement_count"));
    }

    #[test]
    fn telemetry_flags() {
        let args = Args::try_parse_from([
            "speedster",
            "--otel-sdk-disabled",
            "--otel-service-name",
            "home-lab",
        ])
        .unwrap();

        assert_eq!(args.otel_sdk_disabled, Some(true));
        assert_eq!(args.otel_service_name.as_deref(), Some("home-lab"));
        assert_eq!(args.otel_service_namespace, None);
    }
}
