use speedster_speedtest::NetworkError;
use strum::Display;

/// The parts of a run that talk to the network.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Catalog,
    Download,
    Upload,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no servers found")]
    EmptyCatalog,
    #[error("no server with ID {id:?} in the server catalog")]
    UnknownServer { id: String },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MeasurementError {
    #[error("the run was cancelled during the {stage} stage")]
    Cancelled { stage: Stage },
}

/// Terminal error of a run. A run either produces every result or none.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("server selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("failed to fetch the server catalog: {0}")]
    Catalog(#[source] NetworkError),
    #[error("{stage} test failed for measurement {index}: {source}")]
    Phase {
        stage: Stage,
        index: usize,
        #[source]
        source: NetworkError,
    },
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}
