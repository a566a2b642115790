//! System registry — maps system identifiers to their callbacks.
//!
//! The registry is filled before the worker pool starts and is read-only
//! afterwards, so workers share it without a lock. Identifiers are kept in
//! registration order; that order drives distribution every frame.

use std::collections::HashMap;
use std::time::Duration;

use engine_component::Atom;

/// The stored form of a system callback.
pub type SystemFn = Box<dyn Fn(Duration) -> anyhow::Result<()> + Send + Sync + 'static>;

/// A registered system: one callback plus a name for diagnostics.
pub struct SystemRecord {
    /// The system's human-readable name (usually its component type name).
    pub name: String,
    callback: SystemFn,
}

impl SystemRecord {
    /// Wrap a fallible callback.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Duration) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Box::new(callback),
        }
    }

    /// Invoke the callback with this iteration's elapsed time.
    ///
    /// # Errors
    ///
    /// Returns whatever error the system itself returned.
    pub fn invoke(&self, delta: Duration) -> anyhow::Result<()> {
        (self.callback)(delta)
    }
}

impl std::fmt::Debug for SystemRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRecord")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of all systems known to one scheduler.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    /// Systems keyed by identifier.
    systems: HashMap<Atom, SystemRecord>,
    /// Identifiers in registration order.
    order: Vec<Atom>,
}

impl SystemRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system under `id`.
    ///
    /// Returns `false`, leaving the existing record untouched, if `id` is
    /// already registered.
    pub fn register(&mut self, id: Atom, record: SystemRecord) -> bool {
        if self.systems.contains_key(&id) {
            return false;
        }
        self.systems.insert(id, record);
        self.order.push(id);
        true
    }

    /// Returns the record registered under `id`.
    #[must_use]
    pub fn get(&self, id: Atom) -> Option<&SystemRecord> {
        self.systems.get(&id)
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: Atom) -> bool {
        self.systems.contains_key(&id)
    }

    /// Returns the name of the system registered under `id`.
    #[must_use]
    pub fn name_of(&self, id: Atom) -> Option<&str> {
        self.systems.get(&id).map(|record| record.name.as_str())
    }

    /// Registered identifiers in registration order.
    #[must_use]
    pub fn iteration_order(&self) -> &[Atom] {
        &self.order
    }

    /// Iterate over `(id, record)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Atom, &SystemRecord)> {
        self.order
            .iter()
            .filter_map(|id| self.systems.get(id).map(|record| (*id, record)))
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
