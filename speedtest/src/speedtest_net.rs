use crate::{
    NetworkError,
    PhaseSample,
    ServerHandle,
    SpeedTester,
    TransferOptions,
};
use futures::{
    future::{
        join_all,
        try_join_all,
        BoxFuture,
    },
    FutureExt as _,
    StreamExt as _,
};
use reqwest::{
    header::CONTENT_TYPE,
    Client,
    RequestBuilder,
    Response,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{
    timeout_at,
    Instant,
};
use url::Url;

const CATALOG_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&limit=10&https_functional=true";
const USER_AGENT: &str = concat!("speedster/", env!("CARGO_PKG_VERSION"));
const LATENCY_RESOURCE: &str = "latency.txt";
const DOWNLOAD_RESOURCE: &str = "random4000x4000.jpg";
const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;
const PING_COUNT: usize = 5;

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    name: String,
    #[serde(default)]
    sponsor: String,
    country: String,
    #[serde(default)]
    distance: f64,
    url: Url,
}

impl CatalogEntry {
    fn into_handle(self, (latency, jitter): (Duration, Duration)) -> ServerHandle {
        ServerHandle {
            id: self.id,
            name: self.name,
            sponsor: self.sponsor,
            country: self.country,
            distance: self.distance,
            latency,
            jitter,
            url: self.url,
        }
    }
}

/// [`SpeedTester`] backed by the public speedtest.net server network.
#[derive(Debug, Clone)]
pub struct SpeedtestNet {
    client: Client,
    options: TransferOptions,
    catalog_url: Url,
}

impl SpeedtestNet {
    pub fn new(options: TransferOptions) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .connect_timeout(options.timeout)
            .read_timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(NetworkError::Client)?;
        let catalog_url = Url::parse(CATALOG_URL).map_err(|err| NetworkError::InvalidCatalog(err.to_string()))?;
        Ok(Self {
            client,
            options,
            catalog_url,
        })
    }

    #[instrument(level = "debug", skip(self), fields(url = %self.catalog_url))]
    async fn fetch_servers(&self) -> Result<Vec<ServerHandle>, NetworkError> {
        let entries = self
            .get(&self.catalog_url)
            .await?
            .json::<Vec<CatalogEntry>>()
            .await
            .map_err(|err| NetworkError::request(&self.catalog_url, err))?;
        debug!(candidates = entries.len(), "Fetched server list, pinging candidates");

        let latencies = join_all(entries.iter().map(|entry| self.ping_latency(&entry.url))).await;

        let servers = entries
            .into_iter()
            .zip(latencies)
            .filter_map(|(entry, latency)| match latency {
                Ok(sample) => Some(entry.into_handle(sample)),
                Err(err) => {
                    warn!(server.id = %entry.id, server.name = %entry.name, "Dropping unreachable server: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        Ok(servers)
    }

    async fn download(&self, server: &ServerHandle) -> Result<PhaseSample, NetworkError> {
        let url = resource_url(&server.url, DOWNLOAD_RESOURCE)?;
        let started = Instant::now();
        let deadline = started + self.options.test_duration();

        let streams = (0..self.options.streams()).map(|_| self.download_stream(&url, deadline));
        let transferred = try_join_all(streams).await?.into_iter().sum::<u64>();
        let elapsed = started.elapsed();
        if transferred == 0 {
            return Err(NetworkError::Transfer(format!("no data downloaded from {url}")));
        }

        let (latency, jitter) = self.ping_latency(&server.url).await?;
        let throughput_mbps = mbps(transferred, elapsed);
        debug!(server.id = %server.id, transferred, throughput_mbps, "Download finished");

        Ok(PhaseSample {
            throughput_mbps,
            latency,
            jitter,
        })
    }

    async fn download_stream(&self, url: &Url, deadline: Instant) -> Result<u64, NetworkError> {
        let mut transferred = 0;
        while Instant::now() < deadline {
            let request = self.client.get(url.clone());
            let Ok(response) = timeout_at(deadline, self.send(url, request)).await else {
                break;
            };
            let mut body = std::pin::pin!(response?.bytes_stream());
            loop {
                match timeout_at(deadline, body.next()).await {
                    Err(_) => return Ok(transferred),
                    Ok(None) => break,
                    Ok(Some(chunk)) => {
                        transferred += chunk.map_err(|err| NetworkError::request(url, err))?.len() as u64;
                    }
                }
            }
        }
        Ok(transferred)
    }

    async fn upload(&self, server: &ServerHandle) -> Result<PhaseSample, NetworkError> {
        let started = Instant::now();
        let deadline = started + self.options.test_duration();

        let streams = (0..self.options.streams()).map(|_| self.upload_stream(&server.url, deadline));
        let transferred = try_join_all(streams).await?.into_iter().sum::<u64>();
        let elapsed = started.elapsed();
        if transferred == 0 {
            return Err(NetworkError::Transfer(format!("no data uploaded to {}", server.url)));
        }

        let (latency, jitter) = self.ping_latency(&server.url).await?;
        let throughput_mbps = mbps(transferred, elapsed);
        debug!(server.id = %server.id, transferred, throughput_mbps, "Upload finished");

        Ok(PhaseSample {
            throughput_mbps,
            latency,
            jitter,
        })
    }

    async fn upload_stream(&self, url: &Url, deadline: Instant) -> Result<u64, NetworkError> {
        let payload = vec![b'0'; UPLOAD_CHUNK_BYTES];
        let mut transferred = 0;
        while Instant::now() < deadline {
            let request = self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(payload.clone());
            // A chunk still in flight at the deadline doesn't count.
            let Ok(response) = timeout_at(deadline, self.send(url, request)).await else {
                break;
            };
            response?;
            transferred += UPLOAD_CHUNK_BYTES as u64;
        }
        Ok(transferred)
    }

    async fn ping_latency(&self, server_url: &Url) -> Result<(Duration, Duration), NetworkError> {
        let url = resource_url(server_url, LATENCY_RESOURCE)?;
        let mut pings = Vec::with_capacity(PING_COUNT);
        for _ in 0..PING_COUNT {
            let started = Instant::now();
            self.get(&url)
                .await?
                .bytes()
                .await
                .map_err(|err| NetworkError::request(&url, err))?;
            pings.push(started.elapsed());
        }
        Ok(latency_and_jitter(&pings))
    }

    /// A request that has to complete within the configured timeout.
    async fn get(&self, url: &Url) -> Result<Response, NetworkError> {
        let request = self.client.get(url.clone()).timeout(self.options.timeout);
        self.send(url, request).await
    }

    /// Transfers are bounded by the phase deadline instead. The client only limits connecting and stalled reads.
    async fn send(&self, url: &Url, request: RequestBuilder) -> Result<Response, NetworkError> {
        let response = request.send().await.map_err(|err| NetworkError::request(url, err))?;
        check_status(url, response)
    }
}

impl SpeedTester for SpeedtestNet {
    fn fetch_catalog(&self) -> BoxFuture<'_, Result<Vec<ServerHandle>, NetworkError>> {
        self.fetch_servers().boxed()
    }

    fn download_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>> {
        self.download(server).boxed()
    }

    fn upload_test<'a>(&'a self, server: &'a ServerHandle) -> BoxFuture<'a, Result<PhaseSample, NetworkError>> {
        self.upload(server).boxed()
    }
}

fn check_status(url: &Url, response: Response) -> Result<Response, NetworkError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NetworkError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// Resources of a server live next to its upload endpoint.
fn resource_url(server_url: &Url, resource: &str) -> Result<Url, NetworkError> {
    server_url
        .join(resource)
        .map_err(|err| NetworkError::InvalidCatalog(format!("{server_url}: {err}")))
}

/// Mean round trip and mean absolute difference between consecutive round trips.
fn latency_and_jitter(pings: &[Duration]) -> (Duration, Duration) {
    if pings.is_empty() {
        return (Duration::ZERO, Duration::ZERO);
    }
    let latency = pings.iter().sum::<Duration>() / pings.len() as u32;
    let jitter = match pings.len() {
        1 => Duration::ZERO,
        n => pings
            .windows(2)
            .map(|w| w[0].max(w[1]) - w[0].min(w[1]))
            .sum::<Duration>()
            / (n - 1) as u32,
    };
    (latency, jitter)
}

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    (bytes as f64 * 8.0) / elapsed.as_secs_f64() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{
            AsyncReadExt as _,
            AsyncWriteExt as _,
        },
        net::{
            TcpListener,
            TcpStream,
        },
    };

    const TRICKLE_CHUNK: usize = 8 * 1024;
    const TRICKLE_INTERVAL: Duration = Duration::from_millis(50);

    /// Serves `latency.txt`, `upload.php` and a download that trickles forever. Returns the upload endpoint.
    async fn spawn_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket));
            }
        });
        Url::parse(&format!("http://{addr}/speedtest/upload.php")).unwrap()
    }

    async fn serve(mut socket: TcpStream) {
        let mut buffer = Vec::new();
        loop {
            let head_end = loop {
                if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                    break position + 4;
                }
                if !read_more(&mut socket, &mut buffer).await {
                    return;
                }
            };
            let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buffer.len() < head_end + content_length {
                if !read_more(&mut socket, &mut buffer).await {
                    return;
                }
            }
            buffer.drain(..head_end + content_length);

            if head.split_whitespace().nth(1).is_some_and(|path| path.ends_with(DOWNLOAD_RESOURCE)) {
                trickle(&mut socket).await;
                return;
            }
            let response = b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\ntest=test";
            if socket.write_all(response).await.is_err() {
                return;
            }
        }
    }

    async fn read_more(socket: &mut TcpStream, buffer: &mut Vec<u8>) -> bool {
        let mut chunk = [0; 16 * 1024];
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => false,
            Ok(read) => {
                buffer.extend_from_slice(&chunk[..read]);
                true
            }
        }
    }

    async fn trickle(socket: &mut TcpStream) {
        let head = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
        if socket.write_all(head).await.is_err() {
            return;
        }
        let mut chunk = format!("{TRICKLE_CHUNK:x}\r\n").into_bytes();
        chunk.extend_from_slice(&[b'0'; TRICKLE_CHUNK]);
        chunk.extend_from_slice(b"\r\n");
        while socket.write_all(&chunk).await.is_ok() {
            tokio::time::sleep(TRICKLE_INTERVAL).await;
        }
    }

    fn local_server(url: Url) -> ServerHandle {
        ServerHandle {
            id: "1".to_string(),
            name: "Local".to_string(),
            sponsor: "Loopback".to_string(),
            country: "Testland".to_string(),
            distance: 0.0,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            url,
        }
    }

    fn tester(timeout_ms: u64, test_duration_ms: u64) -> SpeedtestNet {
        SpeedtestNet::new(TransferOptions {
            timeout: Duration::from_millis(timeout_ms),
            concurrent_streams: 2,
            test_duration: Some(Duration::from_millis(test_duration_ms)),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn slow_download_outlasts_the_request_timeout() {
        let upload_url = spawn_server().await;
        let url = resource_url(&upload_url, DOWNLOAD_RESOURCE).unwrap();
        let tester = tester(200, 800);

        let started = Instant::now();
        let transferred = tester
            .download_stream(&url, started + Duration::from_millis(800))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(800));
        assert!(transferred >= TRICKLE_CHUNK as u64, "{transferred}");
    }

    #[tokio::test]
    async fn download_phase_runs_until_the_deadline() {
        let server = local_server(spawn_server().await);
        let tester = tester(1_000, 400);

        let started = Instant::now();
        let sample = tester.download_test(&server).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(sample.throughput_mbps > 0.0, "{sample:?}");
    }

    #[tokio::test]
    async fn upload_phase_counts_whole_chunks_until_the_deadline() {
        let server = local_server(spawn_server().await);
        let tester = tester(1_000, 300);

        let started = Instant::now();
        let transferred = tester
            .upload_stream(&server.url, started + Duration::from_millis(300))
            .await
            .unwrap();
        assert!(transferred > 0);
        assert_eq!(transferred % UPLOAD_CHUNK_BYTES as u64, 0);

        let sample = tester.upload_test(&server).await.unwrap();
        assert!(sample.throughput_mbps > 0.0, "{sample:?}");
    }

    #[test]
    fn catalog_entries_become_handles() {
        let json = r#"[{
            "url": "http://speedtest.example.net:8080/speedtest/upload.php",
            "lat": "52.5200",
            "lon": "13.4050",
            "distance": 12,
            "name": "Berlin",
            "country": "Germany",
            "cc": "DE",
            "sponsor": "Example Carrier",
            "id": "31470",
            "preferred": 0,
            "https_functional": 1,
            "host": "speedtest.example.net:8080"
        }]"#;
        let entries: Vec<CatalogEntry> = serde_json::from_str(json).unwrap();
        let entry = entries.into_iter().next().unwrap();
        let handle = entry.into_handle((Duration::from_millis(12), Duration::from_millis(2)));

        assert_eq!(handle.id, "31470");
        assert_eq!(handle.name, "Berlin");
        assert_eq!(handle.sponsor, "Example Carrier");
        assert_eq!(handle.distance, 12.0);
        assert_eq!(handle.latency, Duration::from_millis(12));
        assert_eq!(handle.jitter, Duration::from_millis(2));
    }

    #[test]
    fn resources_are_siblings_of_the_upload_endpoint() {
        let server = Url::parse("http://speedtest.example.net:8080/speedtest/upload.php").unwrap();
        assert_eq!(
            resource_url(&server, LATENCY_RESOURCE).unwrap().as_str(),
            "http://speedtest.example.net:8080/speedtest/latency.txt"
        );
        assert_eq!(
            resource_url(&server, DOWNLOAD_RESOURCE).unwrap().as_str(),
            "http://speedtest.example.net:8080/speedtest/random4000x4000.jpg"
        );
    }

    #[test]
    fn jitter_is_mean_consecutive_difference() {
        let pings = [10, 14, 12, 20].map(Duration::from_millis);
        let (latency, jitter) = latency_and_jitter(&pings);
        assert_eq!(latency, Duration::from_millis(14));
        // |14-10| + |12-14| + |20-12| = 14 over 3 gaps
        assert_eq!(jitter, Duration::from_millis(14) / 3);

        assert_eq!(
            latency_and_jitter(&[Duration::from_millis(7)]),
            (Duration::from_millis(7), Duration::ZERO)
        );
        assert_eq!(latency_and_jitter(&[]), (Duration::ZERO, Duration::ZERO));
    }

    #[test]
    fn throughput_in_megabits() {
        assert_eq!(mbps(12_500_000, Duration::from_secs(1)), 100.0);
        assert_eq!(mbps(12_500_000, Duration::from_secs(10)), 10.0);
        assert_eq!(mbps(1, Duration::ZERO), 0.0);
    }
}
