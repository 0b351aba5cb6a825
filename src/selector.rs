use crate::SelectionError;
use speedster_config::MeasurementStrategy;
use speedster_speedtest::ServerHandle;

/// Picks the server for every round, returning exactly `measurement_count` handles in round order.
///
/// Pinned `server_ids` must all exist in `servers` and are used as given. Without pins, single-server mode takes the
/// lowest-latency server for every round and multi-server mode takes the `measurement_count` lowest-latency servers,
/// reusing them in order when the catalog is too small.
pub fn select(
    servers: &[ServerHandle],
    server_ids: &[String],
    strategy: MeasurementStrategy,
    measurement_count: usize,
) -> Result<Vec<ServerHandle>, SelectionError> {
    if servers.is_empty() {
        return Err(SelectionError::EmptyCatalog);
    }

    let pinned = server_ids
        .iter()
        .map(|id| {
            servers
                .iter()
                .find(|server| &server.id == id)
                .ok_or_else(|| SelectionError::UnknownServer { id: id.clone() })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pool = match strategy {
        MeasurementStrategy::SingleServer => match pinned.first() {
            Some(server) => vec![*server],
            None => vec![lowest_latency(servers)?],
        },
        MeasurementStrategy::MultiServer if !pinned.is_empty() => pinned,
        MeasurementStrategy::MultiServer => {
            let mut ranked = servers.iter().collect::<Vec<_>>();
            // Stable, so equal latencies keep catalog order.
            ranked.sort_by_key(|server| server.latency);
            ranked.truncate(measurement_count);
            if ranked.len() < measurement_count {
                warn!(
                    requested = measurement_count,
                    available = ranked.len(),
                    "Fewer servers than measurements available, reusing servers"
                );
            }
            ranked
        }
    };

    debug!(
        servers = ?pool.iter().map(|server| server.id.as_str()).collect::<Vec<_>>(),
        %strategy,
        "Selected servers"
    );

    Ok((0..measurement_count)
        .map(|round| pool[round % pool.len()].clone())
        .collect())
}

fn lowest_latency(servers: &[ServerHandle]) -> Result<&ServerHandle, SelectionError> {
    servers
        .iter()
        .min_by_key(|server| server.latency)
        .ok_or(SelectionError::EmptyCatalog)
}
