//! System scheduler — registration, worker pool lifecycle and the frame barrier.
//!
//! Systems are registered up front, the pool is spun once, and each call to
//! [`SystemScheduler::execute_iteration`] is one frame:
//!
//! 1. Partition the registered systems round-robin over the worker queues
//!    (`registration index mod thread count`).
//! 2. Mark every worker that received work busy and wake it.
//! 3. Park until every availability bit reads idle again.
//! 4. Report any system failures collected during the frame.
//!
//! Systems on one worker run in registration order; workers run concurrently
//! with no ordering relative to each other.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::sync::{Parker, Unparker};
use engine_component::{Atom, Component};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::registry::{SystemRecord, SystemRegistry};
use crate::worker::{Shared, Worker};

/// Where a scheduler is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting registrations; no threads exist.
    Created,
    /// Workers alive; iterations may run.
    Running,
    /// Shutdown signalled; waiting for workers to acknowledge.
    ShuttingDown,
    /// Workers gone; the scheduler is unusable.
    Terminated,
}

/// A fixed pool of worker threads that runs every registered system once per
/// iteration.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use engine_component::Component;
/// use engine_system::SystemScheduler;
///
/// struct Position;
/// impl Component for Position {}
///
/// let mut scheduler = SystemScheduler::new(2).unwrap();
/// scheduler
///     .register_for_component::<Position>(|delta| assert_eq!(delta, Duration::from_millis(16)))
///     .unwrap();
/// scheduler.spin().unwrap();
/// scheduler.execute_iteration(Duration::from_millis(16)).unwrap();
/// scheduler.shutdown().unwrap();
/// ```
pub struct SystemScheduler {
    config: SchedulerConfig,
    thread_count: usize,
    lifecycle: Lifecycle,
    /// Systems registered before `spin`. Moved into `shared` once the pool starts.
    pending: SystemRegistry,
    shared: Option<Arc<Shared>>,
    /// Wakes each worker, indexed by worker.
    workers: Vec<Unparker>,
    handles: Vec<JoinHandle<()>>,
    /// Parked on while waiting for workers.
    parker: Parker,
    iterations: u64,
}

impl SystemScheduler {
    /// Create a scheduler with up to `maximum_thread_count` workers. `0`
    /// selects the default of 8.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadCountExceeded`] if more workers are
    /// requested than the availability bitmap can track.
    pub fn new(maximum_thread_count: u32) -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::new().with_max_thread_count(maximum_thread_count))
    }

    /// Create a scheduler from a full [`SchedulerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadCountExceeded`] if more workers are
    /// requested than the availability bitmap can track.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let thread_count = config.effective_thread_count()?;
        Ok(Self {
            config,
            thread_count,
            lifecycle: Lifecycle::Created,
            pending: SystemRegistry::new(),
            shared: None,
            workers: Vec::new(),
            handles: Vec::new(),
            parker: Parker::new(),
            iterations: 0,
        })
    }

    /// The system id for component type `T`.
    ///
    /// Stable for the whole process: every scheduler maps `T` to the same id.
    #[must_use]
    pub fn system_id_for_component<T: Component>() -> Atom {
        T::component_type_id()
    }

    /// Register the system for component type `T`.
    ///
    /// Only the first registration for a given `T` stores its callback; later
    /// calls return the same id and drop the new callback.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RegistrationAfterSpin`] once the pool has
    /// started, or [`SchedulerError::ShutDown`] after shutdown.
    pub fn register_for_component<T: Component>(
        &mut self,
        system: impl Fn(Duration) + Send + Sync + 'static,
    ) -> Result<Atom, SchedulerError> {
        self.try_register_for_component::<T>(move |delta| {
            system(delta);
            Ok(())
        })
    }

    /// Register a fallible system for component type `T`.
    ///
    /// An `Err` returned by the system is reported from
    /// [`SystemScheduler::execute_iteration`] the same way a panic is.
    ///
    /// # Errors
    ///
    /// See [`SystemScheduler::register_for_component`].
    pub fn try_register_for_component<T: Component>(
        &mut self,
        system: impl Fn(Duration) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<Atom, SchedulerError> {
        let id = Self::system_id_for_component::<T>();
        self.insert(id, SystemRecord::new(T::type_name(), system))?;
        Ok(id)
    }

    /// Register a system that is not tied to a component type under a fresh id.
    ///
    /// # Errors
    ///
    /// See [`SystemScheduler::register_for_component`].
    pub fn register_system(
        &mut self,
        name: impl Into<String>,
        system: impl Fn(Duration) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<Atom, SchedulerError> {
        let id = Atom::next_id();
        self.insert(id, SystemRecord::new(name, system))?;
        Ok(id)
    }

    fn insert(&mut self, id: Atom, record: SystemRecord) -> Result<(), SchedulerError> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(SchedulerError::RegistrationAfterSpin),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => return Err(SchedulerError::ShutDown),
        }

        let name = record.name.clone();
        if self.pending.register(id, record) {
            debug!(system = %id, name = %name, "system registered");
        } else {
            debug!(system = %id, name = %name, "system already registered; keeping first callback");
        }
        Ok(())
    }

    /// Start the worker pool. Returns once every worker reports idle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadySpun`] if called twice,
    /// [`SchedulerError::ShutDown`] after shutdown, or
    /// [`SchedulerError::Spawn`] if a thread cannot be started (any workers
    /// already started are torn down first).
    pub fn spin(&mut self) -> Result<(), SchedulerError> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(SchedulerError::AlreadySpun),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => return Err(SchedulerError::ShutDown),
        }

        let registry = std::mem::take(&mut self.pending);
        let system_count = registry.system_count();
        let shared = Arc::new(Shared::new(
            registry,
            self.thread_count,
            self.parker.unparker().clone(),
        ));
        self.shared = Some(Arc::clone(&shared));

        for index in 0..self.thread_count {
            let parker = Parker::new();
            let unparker = parker.unparker().clone();
            let worker = Worker::new(index, parker, Arc::clone(&shared));
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", self.config.thread_name_prefix))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => {
                    self.workers.push(unparker);
                    self.handles.push(handle);
                }
                Err(err) => {
                    warn!(worker = index, error = %err, "failed to spawn worker; tearing pool down");
                    self.abort_spin(&shared);
                    return Err(SchedulerError::Spawn(err));
                }
            }
        }

        while !shared.availability.all_idle(self.thread_count) {
            self.parker.park();
        }

        self.lifecycle = Lifecycle::Running;
        info!(
            threads = self.thread_count,
            systems = system_count,
            "worker pool spun"
        );
        Ok(())
    }

    fn abort_spin(&mut self, shared: &Shared) {
        shared.should_shut_down.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.unpark();
        }
        for (index, handle) in self.handles.drain(..).enumerate() {
            join_worker(index, handle);
        }
        self.workers.clear();
        self.lifecycle = Lifecycle::Terminated;
    }

    /// Run one frame: every registered system exactly once with `delta`.
    ///
    /// Blocks until all systems have finished.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::NotSpun`] / [`SchedulerError::ShutDown`] when the
    ///   pool is not running.
    /// - [`SchedulerError::IterationInFlight`] if a worker is still busy.
    /// - [`SchedulerError::SystemFailures`] if any system panicked or returned
    ///   an error. All other systems still ran, and the scheduler remains
    ///   usable for the next frame.
    pub fn execute_iteration(&mut self, delta: Duration) -> Result<(), SchedulerError> {
        let shared = match self.lifecycle {
            Lifecycle::Created => return Err(SchedulerError::NotSpun),
            Lifecycle::ShuttingDown | Lifecycle::Terminated => return Err(SchedulerError::ShutDown),
            Lifecycle::Running => self.shared.as_ref().ok_or(SchedulerError::NotSpun)?,
        };

        let count = self.thread_count;
        if !shared.availability.all_idle(count) {
            return Err(SchedulerError::IterationInFlight {
                mask: shared.availability.load(),
            });
        }

        let started = Instant::now();
        let order = shared.registry.iteration_order();
        for (index, queue) in shared.queues.iter().enumerate() {
            let mut pending = queue.lock();
            pending
                .systems
                .extend(order.iter().skip(index).step_by(count).copied());
            if pending.systems.is_empty() {
                continue;
            }
            pending.delta = delta;
            shared.availability.mark_busy(index);
            drop(pending);
            self.workers[index].unpark();
        }

        while !shared.availability.all_idle(count) {
            self.parker.park();
        }

        self.iterations += 1;
        debug!(
            iteration = self.iterations,
            delta_us = delta.as_micros() as u64,
            systems = order.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "iteration complete"
        );

        let failures = shared.take_failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::SystemFailures(failures))
        }
    }

    /// Signal shutdown and join every worker.
    ///
    /// Waits at most [`SchedulerConfig::shutdown_timeout`] for workers to
    /// acknowledge. Calling it again, or on a scheduler that was never spun,
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutdownTimeout`] if some worker did not
    /// acknowledge in time. Those threads are detached instead of joined.
    pub fn shutdown(&mut self) -> Result<(), SchedulerError> {
        let shared = match (self.lifecycle, self.shared.clone()) {
            (Lifecycle::Terminated, _) => return Ok(()),
            (_, None) => {
                self.lifecycle = Lifecycle::Terminated;
                return Ok(());
            }
            (_, Some(shared)) => shared,
        };

        self.lifecycle = Lifecycle::ShuttingDown;
        shared.should_shut_down.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.unpark();
        }

        let count = self.thread_count;
        let timeout = self.config.shutdown_timeout;
        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        while !shared.shutdown_status.all_set(count) {
            let now = Instant::now();
            if now >= deadline {
                timed_out = true;
                break;
            }
            self.parker.park_timeout(deadline - now);
        }

        for (index, handle) in self.handles.drain(..).enumerate() {
            if !shared.shutdown_status.is_set(index) {
                continue;
            }
            join_worker(index, handle);
        }
        self.workers.clear();
        self.lifecycle = Lifecycle::Terminated;

        if timed_out {
            let pending = shared.shutdown_status.clear_bits(count);
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                pending_mask = pending,
                "workers did not acknowledge shutdown; detaching"
            );
            return Err(SchedulerError::ShutdownTimeout { timeout, pending });
        }

        info!(threads = count, iterations = self.iterations, "worker pool shut down");
        Ok(())
    }

    /// The round-robin plan: for each worker, the systems it runs each frame,
    /// in order.
    #[must_use]
    pub fn assignments(&self) -> Vec<Vec<Atom>> {
        let order = self.registry().iteration_order();
        (0..self.thread_count)
            .map(|index| {
                order
                    .iter()
                    .skip(index)
                    .step_by(self.thread_count)
                    .copied()
                    .collect()
            })
            .collect()
    }

    /// The registered systems.
    #[must_use]
    pub fn registry(&self) -> &SystemRegistry {
        match &self.shared {
            Some(shared) => &shared.registry,
            None => &self.pending,
        }
    }

    /// Number of workers this scheduler runs (or will run once spun).
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Number of iterations completed so far.
    #[must_use]
    pub fn iteration_count(&self) -> u64 {
        self.iterations
    }

    /// Returns `true` if the pool is running and every worker is idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.availability.all_idle(self.thread_count))
    }

    /// Raw availability bitmap (bit set = idle). `0` before spin.
    #[must_use]
    pub fn availability(&self) -> u64 {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.availability.load())
    }

    /// Raw shutdown bitmap (bit set = worker exited). `0` before spin.
    #[must_use]
    pub fn shutdown_status(&self) -> u64 {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.shutdown_status.load())
    }

    /// The configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

/// Join one worker thread, logging if it panicked.
fn join_worker(index: usize, handle: JoinHandle<()>) -> bool {
    let joined = handle.join().is_ok();
    if !joined {
        warn!(worker = index, "worker thread panicked");
    }
    joined
}

impl Drop for SystemScheduler {
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Terminated {
            return;
        }
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "scheduler shutdown failed during drop");
        }
    }
}

impl std::fmt::Debug for SystemScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemScheduler")
            .field("thread_count", &self.thread_count)
            .field("lifecycle", &self.lifecycle)
            .field("systems", &self.registry().system_count())
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}
