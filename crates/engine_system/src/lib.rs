//! # engine_system
//!
//! Parallel system scheduler for the ECS runtime.
//!
//! A [`SystemScheduler`] owns a fixed pool of worker threads. Systems (one
//! callback per component type) are registered up front, the pool is spun
//! once, and every call to [`SystemScheduler::execute_iteration`] runs each
//! registered system exactly once with the frame's elapsed time, returning
//! only after all of them have finished.
//!
//! This crate provides:
//!
//! - [`config`] — [`SchedulerConfig`] and its defaults.
//! - [`registry`] — the identifier → callback registry.
//! - [`thread_mask`] — the atomic per-worker bitmaps.
//! - [`queue`] — lock-guarded per-worker work queues.
//! - [`scheduler`] — the façade and lifecycle.
//! - [`error`] — scheduler error types.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use engine_component::Component;
//! use engine_system::SystemScheduler;
//!
//! struct Velocity;
//! impl Component for Velocity {}
//!
//! let mut scheduler = SystemScheduler::new(4)?;
//! scheduler.register_for_component::<Velocity>(|dt| {
//!     let _ = dt.as_secs_f32();
//! })?;
//! scheduler.spin()?;
//! for _ in 0..3 {
//!     scheduler.execute_iteration(Duration::from_millis(16))?;
//! }
//! scheduler.shutdown()?;
//! # Ok::<(), engine_system::SchedulerError>(())
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod thread_mask;
mod worker;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SystemFailure};
pub use registry::{SystemRecord, SystemRegistry};
pub use scheduler::{Lifecycle, SystemScheduler};
pub use thread_mask::ThreadMask;
