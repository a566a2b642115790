//! Worker threads and the state they share with the scheduler.
//!
//! A worker parks until its queue receives work or shutdown is signalled. On
//! work it drains the queue, runs every system in order, records failures,
//! flips its availability bit back to idle and wakes the scheduler. A failing
//! system never takes the worker down with it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam::sync::{Parker, Unparker};
use tracing::{debug, error, trace};

use crate::error::SystemFailure;
use crate::queue::{Batch, WorkQueue};
use crate::registry::SystemRegistry;
use crate::thread_mask::ThreadMask;

/// State shared between the scheduler and every worker.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Read-only once the pool is running.
    pub registry: SystemRegistry,
    /// One queue per worker, indexed by worker.
    pub queues: Vec<WorkQueue>,
    /// Bit set = worker idle.
    pub availability: ThreadMask,
    /// Bit set = worker acknowledged shutdown and left its loop.
    pub shutdown_status: ThreadMask,
    /// Monotonic false -> true.
    pub should_shut_down: AtomicBool,
    /// Failures collected during the current iteration.
    pub failures: Mutex<Vec<SystemFailure>>,
    /// Wakes whoever is waiting on the pool (spin, barrier or shutdown).
    pub waiter: Unparker,
}

impl Shared {
    pub fn new(registry: SystemRegistry, thread_count: usize, waiter: Unparker) -> Self {
        Self {
            registry,
            queues: (0..thread_count).map(|_| WorkQueue::new()).collect(),
            availability: ThreadMask::new(),
            shutdown_status: ThreadMask::new(),
            should_shut_down: AtomicBool::new(false),
            failures: Mutex::new(Vec::new()),
            waiter,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.should_shut_down.load(Ordering::Acquire)
    }

    /// Take every failure recorded so far.
    pub fn take_failures(&self) -> Vec<SystemFailure> {
        std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record_failure(&self, failure: SystemFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }
}

/// One worker: its lane index, its parker and the shared state.
pub(crate) struct Worker {
    index: usize,
    parker: Parker,
    shared: Arc<Shared>,
}

impl Worker {
    pub fn new(index: usize, parker: Parker, shared: Arc<Shared>) -> Self {
        Self {
            index,
            parker,
            shared,
        }
    }

    /// The worker loop. Returns once shutdown has been observed with an
    /// empty queue.
    pub fn run(self) {
        let shared = &*self.shared;
        shared.availability.mark_idle(self.index);
        shared.waiter.unpark();
        debug!(worker = self.index, "worker started");

        while let Some(batch) = self.wait_for_job() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(batch)));
            if let Err(payload) = outcome {
                error!(
                    worker = self.index,
                    error = %panic_message(payload.as_ref()),
                    "worker panicked outside a system"
                );
                drop_payload(payload);
            }
        }

        shared.shutdown_status.set(self.index);
        shared.waiter.unpark();
        debug!(worker = self.index, "worker exited");
    }

    fn wait_for_job(&self) -> Option<Batch> {
        let queue = &self.shared.queues[self.index];
        loop {
            if let Some(batch) = queue.take() {
                return Some(batch);
            }
            if self.shared.is_shutting_down() {
                return None;
            }
            self.parker.park();
        }
    }

    fn execute(&self, batch: Batch) {
        let shared = &*self.shared;
        shared.availability.mark_busy(self.index);
        let _idle = IdleOnDrop {
            shared,
            index: self.index,
        };

        for id in batch.systems {
            let Some(record) = shared.registry.get(id) else {
                continue;
            };
            trace!(worker = self.index, system = %id, name = %record.name, "running system");

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| record.invoke(batch.delta)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    drop_payload(payload);
                    message
                }
            };

            error!(
                worker = self.index,
                system = %id,
                name = %record.name,
                error = %message,
                "system failed"
            );
            shared.record_failure(SystemFailure {
                system: id,
                name: record.name.clone(),
                message,
            });
        }
    }
}

/// Flips a worker back to idle and wakes the waiter, however `execute` exits.
struct IdleOnDrop<'a> {
    shared: &'a Shared,
    index: usize,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.shared.availability.mark_idle(self.index);
        self.shared.waiter.unpark();
    }
}

/// Dropping a panic payload runs arbitrary code and may panic again.
fn drop_payload(payload: Box<dyn Any + Send>) {
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(payload)));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "system panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use engine_component::AtomFactory;

    use super::*;
    use crate::registry::SystemRecord;

    fn shared_with(registry: SystemRegistry, waiter: &Parker) -> Arc<Shared> {
        Arc::new(Shared::new(registry, 1, waiter.unparker().clone()))
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "system panicked");
    }

    #[test]
    fn test_worker_runs_batch_and_exits_on_shutdown() {
        let ids = AtomFactory::new();
        let (ok, failing) = (ids.next(), ids.next());
        let ran = Arc::new(Mutex::new(Vec::new()));

        let mut registry = SystemRegistry::new();
        {
            let ran = Arc::clone(&ran);
            registry.register(
                ok,
                SystemRecord::new(
                    "ok",
                    move |delta| {
                        ran.lock().unwrap().push(delta);
                        Ok(())
                    },
                ),
            );
        }
        registry.register(
            failing,
            SystemRecord::new("failing", |_| anyhow::bail!("no luck")),
        );

        let waiter = Parker::new();
        let shared = shared_with(registry, &waiter);
        let worker_parker = Parker::new();
        let worker_unparker = worker_parker.unparker().clone();
        let worker = Worker::new(0, worker_parker, Arc::clone(&shared));
        let handle = std::thread::spawn(move || worker.run());

        while !shared.availability.all_idle(1) {
            waiter.park();
        }

        {
            let mut pending = shared.queues[0].lock();
            pending.delta = Duration::from_millis(5);
            pending.systems.extend([failing, ok]);
            shared.availability.mark_busy(0);
        }
        worker_unparker.unpark();

        while !shared.availability.all_idle(1) {
            waiter.park();
        }
        assert_eq!(*ran.lock().unwrap(), vec![Duration::from_millis(5)]);

        let failures = shared.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].system, failing);
        assert_eq!(failures[0].message, "no luck");

        shared.should_shut_down.store(true, Ordering::Release);
        worker_unparker.unpark();
        handle.join().unwrap();
        assert!(shared.shutdown_status.is_set(0));
    }

    struct Explosive;

    impl Drop for Explosive {
        fn drop(&mut self) {
            panic!("payload dropped");
        }
    }

    #[test]
    fn test_panicking_payload_drop_keeps_worker_alive() {
        let ids = AtomFactory::new();
        let (explosive, after) = (ids.next(), ids.next());
        let runs = Arc::new(Mutex::new(0u32));

        let mut registry = SystemRegistry::new();
        registry.register(
            explosive,
            SystemRecord::new("explosive", |_| std::panic::panic_any(Explosive)),
        );
        {
            let runs = Arc::clone(&runs);
            registry.register(
                after,
                SystemRecord::new("after", move |_| {
                    *runs.lock().unwrap() += 1;
                    Ok(())
                }),
            );
        }

        let waiter = Parker::new();
        let shared = shared_with(registry, &waiter);
        let worker_parker = Parker::new();
        let worker_unparker = worker_parker.unparker().clone();
        let worker = Worker::new(0, worker_parker, Arc::clone(&shared));
        let handle = std::thread::spawn(move || worker.run());

        while !shared.availability.all_idle(1) {
            waiter.park();
        }

        for frame in 1..=2 {
            {
                let mut pending = shared.queues[0].lock();
                pending.systems.extend([explosive, after]);
                shared.availability.mark_busy(0);
            }
            worker_unparker.unpark();
            while !shared.availability.all_idle(1) {
                waiter.park();
            }

            assert_eq!(*runs.lock().unwrap(), frame);
            let failures = shared.take_failures();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, "explosive");
            assert_eq!(failures[0].message, "system panicked");
        }

        shared.should_shut_down.store(true, Ordering::Release);
        worker_unparker.unpark();
        handle.join().unwrap();
        assert!(shared.shutdown_status.is_set(0));
    }
}
