//! Trend computation over normalized events: bucket aggregation, moving
//! averages, anomaly flags, windowed summaries, and growth projection.
//!
//! Everything in this module is a pure function of its inputs; there is no
//! shared state and no locking.

mod analyzer;
mod forecast;
mod summary;

pub use analyzer::{TimeBucket, TrendOptions, TrendResult, analyze};
pub use forecast::forecast;
pub use summary::{ActivitySummary, WindowCounts, summarize};
