//! Time-bucket aggregation with moving averages and anomaly flags.

use crate::Result;
use crate::activity::ActivityEvent;
use crate::error::Error;
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::Serialize;

/// A fixed-width interval `[start, end)` with its aggregated counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub start: DateTime<Utc>,

    /// Exclusive end; the last bucket is truncated at the range end rather
    /// than extended past it.
    pub end: DateTime<Utc>,

    /// Number of events whose timestamp falls inside the interval.
    pub count: u64,

    /// Sum of those events' weights.
    pub weighted: f64,
}

/// Knobs for a single analysis pass.
#[derive(Debug, Clone, Copy)]
pub struct TrendOptions {
    /// Width of each bucket.
    pub bucket_width: Duration,

    /// Trailing window, in buckets, for the moving average and deviation.
    pub window: usize,

    /// How many standard deviations from the moving average flags a bucket.
    pub threshold: f64,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            bucket_width: Duration::from_secs(3600),
            window: 6,
            threshold: 2.0,
        }
    }
}

/// Buckets plus derived series. Transient; rebuilt on every analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    /// Contiguous buckets covering the requested range, in order.
    pub buckets: Vec<TimeBucket>,

    /// Trailing-window mean of bucket counts, one per bucket. The first
    /// `window - 1` entries use a shrinking window.
    pub moving_average: Vec<f64>,

    /// Whether each bucket deviates from its moving average beyond the
    /// configured threshold.
    pub anomalies: Vec<bool>,
}

/// Partition `[range_start, range_end)` into buckets of the configured width
/// and aggregate `events` into them.
///
/// Pure with respect to its inputs: identical arguments always produce an
/// identical result. Events outside the range are excluded, not an error. A
/// trailing window holding fewer than 2 buckets never flags an anomaly.
#[expect(clippy::cast_precision_loss, reason = "bucket counts fit comfortably in f64")]
pub fn analyze(
    events: &[ActivityEvent],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    options: &TrendOptions,
) -> Result<TrendResult> {
    let width_ms = i64::try_from(options.bucket_width.as_millis())
        .map_err(|_| Error::Configuration("bucket width is too large".to_string()))?;
    if width_ms <= 0 {
        return Err(Error::Configuration(
            "bucket width must be at least one millisecond".to_string(),
        ));
    }
    if range_start >= range_end {
        return Err(Error::Configuration("analysis range must not be empty".to_string()));
    }
    if options.window == 0 {
        return Err(Error::Configuration(
            "moving-average window must be at least 1".to_string(),
        ));
    }
    if !options.threshold.is_finite() || options.threshold <= 0.0 {
        return Err(Error::Configuration("anomaly threshold must be positive".to_string()));
    }

    let width = chrono::Duration::milliseconds(width_ms);
    let mut buckets = Vec::new();
    let mut start = range_start;
    while start < range_end {
        let end = core::cmp::min(start + width, range_end);
        buckets.push(TimeBucket {
            start,
            end,
            count: 0,
            weighted: 0.0,
        });
        start = end;
    }

    for event in events {
        if event.timestamp < range_start || event.timestamp >= range_end {
            continue;
        }
        let offset_ms = (event.timestamp - range_start).num_milliseconds();
        let index = usize::try_from(offset_ms / width_ms).unwrap_or(usize::MAX);
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.count += 1;
            bucket.weighted += event.weight;
        }
    }

    let counts: Vec<f64> = buckets.iter().map(|bucket| bucket.count as f64).collect();
    let mut moving_average = Vec::with_capacity(counts.len());
    let mut anomalies = Vec::with_capacity(counts.len());

    for index in 0..counts.len() {
        let window_start = index.saturating_sub(options.window - 1);
        let window = &counts[window_start..=index];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        moving_average.push(mean);

        let flagged = if window.len() < 2 {
            false
        } else {
            let variance = window.iter().map(|count| (count - mean).powi(2)).sum::<f64>() / window.len() as f64;
            let current = window.last().copied().unwrap_or_default();
            (current - mean).abs() > options.threshold * variance.sqrt()
        };
        anomalies.push(flagged);
    }

    Ok(TrendResult {
        buckets,
        moving_average,
        anomalies,
    })
}
