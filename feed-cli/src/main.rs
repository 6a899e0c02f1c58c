mod cli;
mod error;
mod manifest;
mod sim;

use crate::cli::Args;
use crate::error::Result;
use crate::sim::SimulatedEngine;
use clap::Parser;
use feed_engine::{
    FeedEvent, FeedManagerConfig, HttpEngineConfig, HttpPlaybackEngine, PlaybackEngine,
    VideoManager, VideoPhase,
};
use feed_types::VideoId;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// How long one scroll step waits for the current video to settle before
/// moving on anyway.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let records = manifest::load(&args.manifest)?;
    info!(count = records.len(), manifest = %args.manifest.display(), "manifest loaded");

    let config = FeedManagerConfig {
        preload_range: args.preload_range,
        retention_margin: args.retention_margin,
        max_retries: args.max_retries,
        memory_ceiling_bytes: args.memory_ceiling_mb * 1024 * 1024,
        memory_pressure_ceiling_bytes: args.memory_ceiling_mb * 1024 * 1024 / 2,
        ..Default::default()
    };

    let engine: Arc<dyn PlaybackEngine> = if args.simulate {
        Arc::new(SimulatedEngine::new(
            Duration::from_millis(args.sim_latency_ms),
            args.sim_failure_rate,
        ))
    } else {
        Arc::new(HttpPlaybackEngine::new(HttpEngineConfig::default())?)
    };

    let manager = VideoManager::new(config, engine)?;
    spawn_event_logger(&manager);

    for record in records {
        manager.add_video_event(record);
    }
    let ids = manager.video_ids();

    let steps = args.steps.unwrap_or(ids.len()).min(ids.len());
    let dwell = Duration::from_millis(args.dwell_ms);
    info!(steps, preload_range = args.preload_range, "starting scroll session");

    for (step, id) in ids.iter().take(steps).enumerate() {
        manager.preload_around_index(step, args.preload_range);
        wait_for_settled(&manager, id).await;

        let state = manager.video_state(id);
        match state.as_ref().map(|s| s.phase) {
            Some(VideoPhase::Ready) => debug!(step, %id, "playing"),
            Some(phase) => warn!(step, %id, ?phase, "current video not playable"),
            None => warn!(step, %id, "current video dropped from the feed"),
        }

        if args.pressure_at_step == Some(step) {
            info!(step, "injecting memory pressure");
            manager.handle_memory_pressure().await;
        }

        let stats = manager.stats();
        debug!(
            step,
            ready = stats.ready,
            loading = stats.loading,
            failed = stats.failed_retriable + stats.failed_permanent,
            ready_bytes = stats.ready_bytes,
            "scroll step"
        );
        tokio::time::sleep(dwell).await;
    }

    let stats = manager.stats();
    let metrics = manager.metrics();
    info!(
        total = stats.total,
        ready = stats.ready,
        failed_retriable = stats.failed_retriable,
        failed_permanent = stats.failed_permanent,
        ready_bytes = stats.ready_bytes,
        loads_started = metrics.loads_started,
        loads_succeeded = metrics.loads_succeeded,
        loads_failed = metrics.loads_failed,
        loads_cancelled = metrics.loads_cancelled,
        retries = metrics.retries,
        evictions = metrics.evictions,
        peak_ready_bytes = metrics.peak_ready_bytes,
        "scroll session finished"
    );

    manager.shutdown().await;
    Ok(())
}

/// Wait until the current video reaches a settled phase (ready, failed, or
/// disposed), bounded by [`SETTLE_TIMEOUT`].
async fn wait_for_settled(manager: &VideoManager, id: &VideoId) {
    let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match manager.video_state(id).map(|s| s.phase) {
                Some(VideoPhase::Ready | VideoPhase::Failed { .. } | VideoPhase::Disposed)
                | None => return,
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await;

    if settled.is_err() {
        warn!(%id, "video did not settle in time, scrolling on");
    }
}

fn spawn_event_logger(manager: &VideoManager) {
    let mut rx = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(FeedEvent::Added { id }) => debug!(%id, "added"),
                Ok(FeedEvent::PhaseChanged { id, from, to }) => {
                    debug!(%id, ?from, ?to, "phase change");
                }
                Ok(FeedEvent::Removed { id }) => debug!(%id, "removed"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
