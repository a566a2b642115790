//! Host tick loop.
//!
//! Drives a [`SystemScheduler`] at a fixed rate:
//!
//! 1. Measure the real time since the previous tick started.
//! 2. Run one scheduler iteration with that elapsed time.
//! 3. Sleep for whatever is left of the frame budget.
//!
//! System failures are logged and counted; the loop keeps going. Any other
//! scheduler error ends the loop.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use engine_system::{Lifecycle, SchedulerError, SystemScheduler};
use tracing::{debug, info, warn};

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// The frame budget implied by `tick_rate`.
    ///
    /// # Errors
    ///
    /// Fails if `tick_rate` is not a positive, finite number.
    pub fn tick_duration(&self) -> Result<Duration> {
        ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick rate must be a positive number, got {}",
            self.tick_rate
        );
        Ok(Duration::from_secs_f64(1.0 / self.tick_rate))
    }
}

/// The tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    /// Ticks in which at least one system failed.
    failed_ticks: u64,
    /// Tick configuration.
    config: TickConfig,
    /// The scheduler running every system.
    scheduler: SystemScheduler,
}

impl TickLoop {
    /// Create a tick loop around a scheduler whose systems are registered.
    #[must_use]
    pub fn new(config: TickConfig, scheduler: SystemScheduler) -> Self {
        Self {
            tick_id: 0,
            failed_ticks: 0,
            config,
            scheduler,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the number of ticks in which a system failed.
    #[must_use]
    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks
    }

    /// Returns a reference to the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    /// Run one tick with the given elapsed time, spinning the pool first if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns any scheduler error other than system failures.
    pub fn tick(&mut self, dt: Duration) -> Result<(), SchedulerError> {
        if self.scheduler.lifecycle() == Lifecycle::Created {
            self.scheduler.spin()?;
        }

        self.tick_id += 1;
        debug!(tick_id = self.tick_id, dt_us = dt.as_micros() as u64, "tick start");

        match self.scheduler.execute_iteration(dt) {
            Ok(()) => Ok(()),
            Err(SchedulerError::SystemFailures(failures)) => {
                self.failed_ticks += 1;
                for failure in &failures {
                    warn!(tick_id = self.tick_id, %failure, "system failed this tick");
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an invalid tick rate, or the first scheduler error that is not
    /// a system failure.
    pub fn run(&mut self) -> Result<()> {
        let tick_duration = self.config.tick_duration()?;
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            threads = self.scheduler.thread_count(),
            "starting tick loop"
        );

        // The first frame reports one nominal budget.
        let now = Instant::now();
        let mut last_start = now.checked_sub(tick_duration).unwrap_or(now);
        loop {
            let start = Instant::now();
            let dt = start - last_start;
            last_start = start;

            self.tick(dt)?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, failed = self.failed_ticks, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        Ok(())
    }

    /// Stop the scheduler's worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutdownTimeout`] if workers do not stop in time.
    pub fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.scheduler.shutdown()
    }
}
