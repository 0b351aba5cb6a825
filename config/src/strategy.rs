use crate::ConfigError;
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// Per-request timeout handed to the measurement primitive when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How measurement rounds are distributed across servers.
#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MeasurementStrategy {
    /// Every round targets the same server.
    #[default]
    SingleServer,
    /// Every round targets a different server.
    MultiServer,
}

/// The validated execution plan of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub server_ids: Vec<String>,
    pub measurement_count: usize,
    pub strategy: MeasurementStrategy,
    pub skip_download: bool,
    pub skip_upload: bool,
    pub timeout: Duration,
    /// Zero lets the measurement primitive pick.
    pub concurrent_streams: usize,
    /// `None` lets the measurement primitive pick.
    pub test_duration: Option<Duration>,
}

/// Turns raw configuration values into a [`RunConfig`].
///
/// An unknown strategy name falls back to [`MeasurementStrategy::SingleServer`] with a warning. Server ID lists that
/// don't fit the strategy are rejected. Transfer settings start out at their defaults and both phases are enabled;
/// callers override them with struct update syntax.
pub fn resolve<S: AsRef<str>>(
    raw_server_ids: &[S],
    measurement_count: usize,
    raw_strategy: &str,
) -> Result<RunConfig, ConfigError> {
    if measurement_count == 0 {
        return Err(ConfigError::ZeroMeasurementCount);
    }

    let strategy = parse_strategy(raw_strategy);
    let server_ids = raw_server_ids
        .iter()
        .flat_map(|raw| parse_server_ids(raw.as_ref()))
        .collect::<Vec<_>>();

    validate_server_ids(&server_ids, strategy, measurement_count)?;

    Ok(RunConfig {
        server_ids,
        measurement_count,
        strategy,
        skip_download: false,
        skip_upload: false,
        timeout: DEFAULT_TIMEOUT,
        concurrent_streams: 0,
        test_duration: None,
    })
}

fn parse_strategy(raw: &str) -> MeasurementStrategy {
    match raw.trim().parse::<MeasurementStrategy>() {
        Ok(strategy) => strategy,
        Err(_) => {
            let fallback = MeasurementStrategy::default();
            warn!(strategy = raw, %fallback, "Invalid measurement strategy, falling back");
            fallback
        }
    }
}

/// Splits a comma-separated list of server IDs. Whitespace is trimmed, empty entries are dropped, order and
/// duplicates are kept.
pub fn parse_server_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_server_ids(
    server_ids: &[String],
    strategy: MeasurementStrategy,
    measurement_count: usize,
) -> Result<(), ConfigError> {
    let found = server_ids.len();
    match strategy {
        MeasurementStrategy::SingleServer if found > 1 => Err(ConfigError::SingleServerIds { strategy, found }),
        MeasurementStrategy::MultiServer if found != 0 && found != measurement_count => {
            Err(ConfigError::MultiServerIds {
                strategy,
                expected: measurement_count,
                found,
            })
        }
        _ => Ok(()),
    }
}
