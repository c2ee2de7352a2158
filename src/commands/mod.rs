//! Command-line interface for repo-pulse.
//!
//! A thin presentation layer over [`ActivityEngine`]: parse arguments, run
//! one analysis, and render the report as a console table or JSON. Partial
//! data is rendered with a warning banner instead of being discarded.

use crate::Result;
use crate::activity::EventKind;
use crate::config::EngineConfig;
use crate::engine::{ALL_KINDS, ActivityEngine, TrendReport};
use crate::github::RepoId;
use crate::trend;
use chrono::Utc;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, ValueEnum};
use core::time::Duration;

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

const LOG_TARGET: &str = "  commands";

/// How many buckets past the end of the range to project.
const FORECAST_PERIODS: usize = 7;

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable console table
    Console,

    /// Machine-readable JSON
    Json,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

impl LogLevel {
    const fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::None => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "repo-pulse", version, about = "Analyze GitHub repository activity trends", author)]
#[command(styles = CLAP_STYLES)]
struct Args {
    /// Repository to analyze, as owner/name
    #[arg(long, value_name = "OWNER/NAME")]
    repo: RepoId,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Event kinds to include (defaults to commits, issues, pull requests, and stars)
    #[arg(long, value_delimiter = ',', value_name = "KIND")]
    kinds: Vec<EventKind>,

    /// How many days of history to analyze
    #[arg(long, default_value_t = 30, value_name = "DAYS")]
    days: u32,

    /// Bucket width in hours
    #[arg(long, default_value_t = 24, value_name = "HOURS")]
    bucket_hours: u32,

    /// Moving-average window, in buckets
    #[arg(long, default_value_t = 6, value_name = "BUCKETS")]
    window: usize,

    /// Anomaly threshold, in standard deviations
    #[arg(long, default_value_t = 2.0, value_name = "SIGMA")]
    threshold: f64,

    /// Serve stale cached data when a refresh fails
    #[arg(long)]
    serve_stale: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    format: OutputFormat,

    /// Logging verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, value_name = "LEVEL")]
    log_level: LogLevel,
}

/// Parse arguments, run one analysis, and print the report.
///
/// Designed to be called from `main` with the program arguments.
pub async fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args = Args::parse_from(args);

    env_logger::Builder::new().filter_level(args.log_level.to_filter()).init();

    let mut config = EngineConfig::new(args.github_token);
    config.serve_stale_on_error = args.serve_stale;
    config.window = args.window;
    config.anomaly_threshold = args.threshold;

    let engine = ActivityEngine::new(config)?;

    let range_end = Utc::now();
    let range_start = range_end - chrono::Duration::days(i64::from(args.days));
    let bucket_width = Duration::from_secs(u64::from(args.bucket_hours) * 3600);

    let kinds = if args.kinds.is_empty() {
        ALL_KINDS.to_vec()
    } else {
        args.kinds
    };

    log::info!(target: LOG_TARGET, "analyzing {} day(s) of activity for {}", args.days, args.repo);
    let report = engine.trend(&args.repo, &kinds, range_start, range_end, bucket_width).await?;

    match args.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Console => print_console(&report),
    }

    Ok(())
}

fn print_json(report: &TrendReport) {
    match serde_json::to_string_pretty(report) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => log::error!(target: LOG_TARGET, "could not render JSON report: {e}"),
    }
}

fn print_console(report: &TrendReport) {
    if !report.errors.is_empty() {
        println!("warning: partial data, {} fetch failure(s):", report.errors.len());
        for error in &report.errors {
            println!("  - {error}");
        }
        println!();
    }

    println!("Activity trend for {}", report.repo);
    println!("{:<18} {:>7} {:>12}", "bucket start", "count", "moving avg");
    for ((bucket, average), flagged) in report
        .result
        .buckets
        .iter()
        .zip(&report.result.moving_average)
        .zip(&report.result.anomalies)
    {
        let marker = if *flagged { "  <-- anomaly" } else { "" };
        let start = bucket.start.format("%Y-%m-%d %H:%M").to_string();
        println!("{start:<18} {:>7} {:>12.2}{marker}", bucket.count, average);
    }

    let projection = trend::forecast(&report.result.buckets, FORECAST_PERIODS);
    if !projection.is_empty() {
        let rendered: Vec<String> = projection.iter().map(|count| format!("{count:.1}")).collect();
        println!();
        println!("Projected counts for the next {FORECAST_PERIODS} bucket(s): {}", rendered.join(", "));
    }

    println!();
    println!(
        "Last 7 days: {} commit(s), {} issue(s), {} pull request(s), {} star(s)",
        report.summary.commits.last_7_days,
        report.summary.issues.last_7_days,
        report.summary.pull_requests.last_7_days,
        report.summary.stars.last_7_days
    );

    if report.skipped > 0 {
        println!("note: {} malformed record(s) were skipped", report.skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_arguments() {
        let args = Args::try_parse_from([
            "repo-pulse",
            "--repo",
            "tokio-rs/tokio",
            "--github-token",
            "ghp_example",
        ])
        .expect("valid arguments");

        assert_eq!(args.repo.to_string(), "tokio-rs/tokio");
        assert_eq!(args.days, 30);
        assert_eq!(args.bucket_hours, 24);
        assert!(args.kinds.is_empty());
        assert_eq!(args.format, OutputFormat::Console);
    }

    #[test]
    fn parses_comma_separated_kinds() {
        let args = Args::try_parse_from([
            "repo-pulse",
            "--repo",
            "o/r",
            "--github-token",
            "t",
            "--kinds",
            "commit,pull_request",
        ])
        .expect("valid arguments");

        assert_eq!(args.kinds, vec![EventKind::Commit, EventKind::PullRequest]);
    }

    #[test]
    fn rejects_malformed_repo() {
        let result = Args::try_parse_from(["repo-pulse", "--repo", "not-a-repo", "--github-token", "t"]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_kind() {
        let result = Args::try_parse_from([
            "repo-pulse",
            "--repo",
            "o/r",
            "--github-token",
            "t",
            "--kinds",
            "gists",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn log_level_maps_to_filter() {
        assert_eq!(LogLevel::None.to_filter(), log::LevelFilter::Off);
        assert_eq!(LogLevel::Trace.to_filter(), log::LevelFilter::Trace);
    }
}
