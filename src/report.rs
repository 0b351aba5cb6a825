use crate::{
    RunOutcome,
    SeriesStats,
};
use comfy_table::{
    presets,
    Attribute,
    Cell,
    CellAlignment,
    Color,
    ContentArrangement,
    Table,
};
use speedster_config::RunConfig;
use std::time::Duration;

/// Logs every round the way operators grep for it.
pub fn log_results(outcome: &RunOutcome) {
    for result in &outcome.results {
        info!(
            measurement_index = result.measurement_index,
            "Server: {}, Download: {:.2} Mbps, Upload: {:.2} Mbps, Latency: {} ms, Jitter: {} ms",
            result.server,
            result.download_mbps,
            result.upload_mbps,
            result.latency.as_millis(),
            result.jitter.as_millis(),
        );
    }
}

/// Renders the run as a terminal table: one row per round and the aggregate rows for multi-round runs.
pub fn format(config: &RunConfig, outcome: &RunOutcome) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Server").add_attribute(Attribute::Bold),
            Cell::new("Download (Mbps)").add_attribute(Attribute::Bold),
            Cell::new("Upload (Mbps)").add_attribute(Attribute::Bold),
            Cell::new("Latency (ms)").add_attribute(Attribute::Bold),
            Cell::new("Jitter (ms)").add_attribute(Attribute::Bold),
            Cell::new("Duration (s)").add_attribute(Attribute::Bold),
        ]);

    for result in &outcome.results {
        table.add_row(vec![
            Cell::new(result.measurement_index),
            Cell::new(result.server.to_string()),
            throughput_cell(result.download_mbps, config.skip_download),
            throughput_cell(result.upload_mbps, config.skip_upload),
            Cell::new(millis(result.latency)).set_alignment(CellAlignment::Right),
            Cell::new(millis(result.jitter)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", result.duration.as_secs_f64())).set_alignment(CellAlignment::Right),
        ]);
    }

    if let Some(statistics) = &outcome.statistics {
        let rows: [(&str, fn(&SeriesStats) -> f64); 3] = [
            ("min", |s| s.min),
            ("mean", |s| s.mean),
            ("max", |s| s.max),
        ];
        for (label, pick) in rows {
            table.add_row(vec![
                Cell::new(label).add_attribute(Attribute::Italic),
                Cell::new(""),
                Cell::new(format!("{:.2}", pick(&statistics.download_mbps)))
                    .fg(Color::Cyan)
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", pick(&statistics.upload_mbps)))
                    .fg(Color::Cyan)
                    .set_alignment(CellAlignment::Right),
            ]);
        }
    }

    format!(
        "Speed test started {} ({} strategy, {} measurement{})\n{table}",
        outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        config.strategy,
        config.measurement_count,
        if config.measurement_count == 1 { "" } else { "s" },
    )
}

/// The run as JSON, for `--output-file`.
pub fn summary(config: &RunConfig, outcome: &RunOutcome) -> serde_json::Value {
    let results = outcome
        .results
        .iter()
        .map(|result| {
            serde_json::json!({
                "measurement_index": result.measurement_index,
                "server": result.server,
                "download_mbps": result.download_mbps,
                "upload_mbps": result.upload_mbps,
                "latency_ms": millis_f64(result.latency),
                "jitter_ms": millis_f64(result.jitter),
                "duration_seconds": result.duration.as_secs_f64(),
            })
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "started_at": outcome.started_at,
        "measurement_count": config.measurement_count,
        "measurement_strategy": config.strategy,
        "results": results,
        "statistics": outcome.statistics,
    })
}

fn throughput_cell(mbps: f64, skipped: bool) -> Cell {
    let cell = if skipped {
        Cell::new("skipped").fg(Color::DarkGrey)
    } else {
        Cell::new(format!("{mbps:.2}"))
    };
    cell.set_alignment(CellAlignment::Right)
}

fn millis(duration: Duration) -> String {
    format!("{:.1}", millis_f64(duration))
}

fn millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
