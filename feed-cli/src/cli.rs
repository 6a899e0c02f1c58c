use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "feedsim",
    version,
    about = "Simulates a scroll session over a JSON feed manifest"
)]
pub struct Args {
    /// Path to the JSON feed manifest (array of records).
    pub manifest: PathBuf,

    /// Videos preloaded on each side of the current position.
    #[arg(long, default_value_t = 2)]
    pub preload_range: usize,

    /// Extra positions kept alive on each side beyond the preload window.
    #[arg(long, default_value_t = 4)]
    pub retention_margin: usize,

    /// Memory ceiling for ready media, in megabytes.
    #[arg(long, default_value_t = 256)]
    pub memory_ceiling_mb: u64,

    /// Automatic retries per video before a failure goes permanent.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Milliseconds spent on each video before scrolling on.
    #[arg(long, default_value_t = 400)]
    pub dwell_ms: u64,

    /// Stop after this many scroll steps instead of walking the whole feed.
    #[arg(long)]
    pub steps: Option<usize>,

    /// Use the built-in simulated engine instead of fetching over HTTP.
    #[arg(long)]
    pub simulate: bool,

    /// Simulated engine: load latency in milliseconds.
    #[arg(long, default_value_t = 120)]
    pub sim_latency_ms: u64,

    /// Simulated engine: probability in [0, 1] that a load fails.
    #[arg(long, default_value_t = 0.0)]
    pub sim_failure_rate: f64,

    /// Inject a memory-pressure signal at this scroll step.
    #[arg(long)]
    pub pressure_at_step: Option<usize>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
