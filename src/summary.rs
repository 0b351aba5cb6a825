use crate::MeasurementResult;
use serde::Serialize;

/// Mean, minimum and maximum of one throughput series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub download_mbps: SeriesStats,
    pub upload_mbps: SeriesStats,
}

/// Aggregates the download and upload series of a run independently.
pub fn summarize(results: &[MeasurementResult]) -> Statistics {
    Statistics {
        download_mbps: series(results.iter().map(|result| result.download_mbps)),
        upload_mbps: series(results.iter().map(|result| result.upload_mbps)),
    }
}

fn series(values: impl Iterator<Item = f64>) -> SeriesStats {
    let mut count = 0usize;
    let mut stats = SeriesStats {
        mean: 0.0,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };
    for value in values {
        count += 1;
        stats.mean += value;
        stats.min = stats.min.min(value);
        stats.max = stats.max.max(value);
    }
    if count == 0 {
        return SeriesStats::default();
    }
    stats.mean /= count as f64;
    stats
}
