//! Network measurement primitive: the server catalog plus download and upload transfers against a single server.

#[macro_use]
extern crate tracing;

mod error;
mod server;
mod speedtest_net;
mod tester;

pub use error::NetworkError;
pub use server::{
    ServerHandle,
    ServerInfo,
};
pub use speedtest_net::SpeedtestNet;
pub use tester::{
    PhaseSample,
    SpeedTester,
    TransferOptions,
    DEFAULT_CONCURRENT_STREAMS,
    DEFAULT_TEST_DURATION,
};
