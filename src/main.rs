//! Analyze GitHub repository activity trends from the command line.
//!
//! # Overview
//!
//! `repo-pulse` fetches commits, issues, pull requests, and stars for a
//! repository, buckets them into a time series, and reports moving averages,
//! anomaly flags, a short projection, and recent-activity counts.
//!
//! # Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=ghp_yourtoken
//! repo-pulse --repo tokio-rs/tokio
//! ```
//!
//! Narrow the analysis to specific event kinds and a finer grid:
//!
//! ```bash
//! repo-pulse --repo tokio-rs/tokio --kinds commit,star --days 7 --bucket-hours 1
//! ```
//!
//! Emit JSON for another tool to render:
//!
//! ```bash
//! repo-pulse --repo tokio-rs/tokio --format json
//! ```

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match repo_pulse::run(std::env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("repo-pulse: {e}");
            ExitCode::FAILURE
        }
    }
}
