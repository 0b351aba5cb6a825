use crate::MeasurementStrategy;

/// Configuration problems detected before any network activity.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("the measurement count must be at least 1")]
    ZeroMeasurementCount,
    #[error("in {strategy} mode, you can only specify 0 or 1 server ID (found {found})")]
    SingleServerIds { strategy: MeasurementStrategy, found: usize },
    #[error(
        "in {strategy} mode with {expected} measurements, you must provide exactly {expected} server IDs or none (found {found})"
    )]
    MultiServerIds {
        strategy: MeasurementStrategy,
        expected: usize,
        found: usize,
    },
    #[error("invalid duration {value:?} for `{key}`")]
    InvalidDuration { key: &'static str, value: String },
    #[error("failed to load the configuration: {0}")]
    Layering(#[from] config::ConfigError),
}
