//! # engine_app — frame loop host
//!
//! Hosts a [`SystemScheduler`] and drives it from a fixed-rate frame timer.
//!
//! ## Startup Sequence
//!
//! 1. Build the scheduler config (`ENGINE_THREAD_COUNT`, overridden by
//!    `--threads`).
//! 2. Spawn the demo entities and register one system per component type.
//! 3. Enter the fixed-timestep tick loop.
//! 4. Shut the worker pool down and report.

mod demo;
mod tick;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine_system::{SchedulerConfig, SystemScheduler};
use tick::{TickConfig, TickLoop};

#[derive(Parser, Debug)]
#[command(name = "engine_app", about = "Runs ECS systems on a parallel frame scheduler")]
struct Args {
    /// Worker thread count (0 = default of 8; at most 64)
    #[arg(short, long)]
    threads: Option<u32>,

    /// Target ticks per second
    #[arg(short = 'r', long, default_value_t = 60.0, value_parser = parse_tick_rate)]
    tick_rate: f64,

    /// Number of ticks to run (0 = run forever)
    #[arg(short = 'n', long, default_value_t = 600)]
    ticks: u64,

    /// Number of demo entities
    #[arg(short, long, default_value_t = 10_000)]
    entities: usize,
}

fn parse_tick_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|err| format!("{err}"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("must be a positive number, got {rate}"))
    }
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("engine_app=info,engine_system=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = SchedulerConfig::from_env()?;
    if let Some(threads) = args.threads {
        config = config.with_max_thread_count(threads);
    }

    let mut scheduler = SystemScheduler::with_config(config).context("invalid scheduler configuration")?;
    let world = Arc::new(demo::DemoWorld::new(args.entities));
    demo::register_systems(&mut scheduler, &world)?;
    info!(
        entities = world.entity_count(),
        systems = scheduler.registry().system_count(),
        threads = scheduler.thread_count(),
        "systems registered"
    );

    let mut tick_loop = TickLoop::new(
        TickConfig {
            tick_rate: args.tick_rate,
            max_ticks: args.ticks,
        },
        scheduler,
    );
    tick_loop.run()?;

    let ticks = tick_loop.tick_id();
    let failed = tick_loop.failed_ticks();
    tick_loop.shutdown().context("worker pool did not shut down cleanly")?;

    info!(ticks, failed, "engine shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_rate_must_be_positive() {
        assert!(Args::try_parse_from(["engine_app", "--tick-rate", "0"]).is_err());
        assert!(Args::try_parse_from(["engine_app", "--tick-rate=-5"]).is_err());
        assert!(Args::try_parse_from(["engine_app", "-r", "NaN"]).is_err());

        let args = Args::try_parse_from(["engine_app", "-r", "30"]).unwrap();
        assert_eq!(args.tick_rate, 30.0);
    }
}
