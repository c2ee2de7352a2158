//! Least-squares projection of bucket counts.

use super::analyzer::TimeBucket;

/// Project bucket counts `periods` steps past the end of the series with a
/// least-squares linear fit.
///
/// Fewer than two buckets give nothing to fit, so the projection is empty.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "bucket counts and indexes fit comfortably in f64")]
pub fn forecast(buckets: &[TimeBucket], periods: usize) -> Vec<f64> {
    if buckets.len() < 2 || periods == 0 {
        return Vec::new();
    }

    let n = buckets.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = buckets.iter().map(|bucket| bucket.count as f64).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut spread = 0.0;
    for (index, bucket) in buckets.iter().enumerate() {
        let dx = index as f64 - mean_x;
        covariance += dx * (bucket.count as f64 - mean_y);
        spread += dx * dx;
    }

    let slope = if spread.abs() < f64::EPSILON { 0.0 } else { covariance / spread };
    let intercept = mean_y - slope * mean_x;

    (0..periods)
        .map(|step| slope * ((buckets.len() + step) as f64) + intercept)
        .collect()
}
