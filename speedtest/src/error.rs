/// Failures while talking to the server catalog or a test server.
#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error("failed to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("the server catalog could not be used: {0}")]
    InvalidCatalog(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl NetworkError {
    pub(crate) fn request(url: &url::Url, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }
}
