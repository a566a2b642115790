//! Process-unique opaque identifiers.
//!
//! An [`Atom`] is a lightweight `u64` identifier with no inherent meaning.
//! Atoms are handed out by an [`AtomFactory`], which guarantees that every
//! value it issues is strictly greater than the previous one and is never
//! issued twice.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The process-wide sequence. Component type tags and system keys share it so
/// they can never collide inside one registry.
static ATOMS: AtomFactory = AtomFactory::new();

/// An opaque, process-unique identifier.
///
/// Two atoms are equal iff they were returned by the same call to
/// [`AtomFactory::next`]. Ordering only reflects issue order within a single
/// factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Atom(u64);

impl Atom {
    /// Create an atom from a raw `u64` value.
    ///
    /// Only meant for deserialising identifiers that were issued elsewhere;
    /// fresh identifiers must come from an [`AtomFactory`].
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw `u64` value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Issue the next atom from the process-wide sequence.
    #[must_use]
    pub fn next_id() -> Self {
        ATOMS.next()
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Atom({})", self.0)
    }
}

/// A lock-free source of strictly increasing [`Atom`]s.
///
/// Safe to share between threads; `next` is a single `fetch_add`.
#[derive(Debug)]
pub struct AtomFactory {
    next: AtomicU64,
}

impl AtomFactory {
    /// Creates a factory whose first atom is `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a factory whose first atom is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Issues a fresh atom.
    pub fn next(&self) -> Atom {
        // Relaxed is enough: uniqueness comes from the RMW, not from ordering
        // with other memory.
        Atom(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the value the next call to [`AtomFactory::next`] will issue.
    #[must_use]
    pub fn peek(&self) -> Atom {
        Atom(self.next.load(Ordering::Relaxed))
    }
}

impl Default for AtomFactory {
    fn default() -> Self {
        Self::new()
    }
}
