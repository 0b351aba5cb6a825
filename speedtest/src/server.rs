use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use url::Url;

/// A test server as offered by the server catalog. Plain data, detached from the catalog that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHandle {
    pub id: String,
    pub name: String,
    pub sponsor: String,
    pub country: String,
    /// Distance to the server in kilometers.
    pub distance: f64,
    /// Latency estimate measured while fetching the catalog.
    pub latency: Duration,
    /// Jitter estimate measured while fetching the catalog.
    pub jitter: Duration,
    /// Upload endpoint of the server. Download and latency resources live next to it.
    pub url: Url,
}

/// Identity of a server, snapshotted into every measurement result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub name: String,
    pub country: String,
    pub distance: f64,
}

impl ServerHandle {
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            country: self.country.clone(),
            distance: self.distance,
        }
    }
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, id {})", self.name, self.country, self.id)
    }
}
