//! Core [`Component`] trait and per-type identity.
//!
//! The scheduler never touches component data; it only needs a stable key per
//! component type. Every type implementing [`Component`] is lazily mapped to
//! exactly one [`Atom`] the first time its identity is requested, and the same
//! atom is returned for the rest of the process lifetime.

use std::any::TypeId;
use std::sync::LazyLock;

use dashmap::DashMap;

use crate::atom::Atom;

/// Process-wide `TypeId -> Atom` cache backing [`Component::component_type_id`].
static COMPONENT_TYPE_IDS: LazyLock<DashMap<TypeId, Atom>> = LazyLock::new(DashMap::new);

/// The core component trait.
///
/// Components must be `Send + Sync` so systems running on worker threads can
/// share them.
///
/// # Examples
///
/// ```rust
/// use engine_component::Component;
///
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {}
///
/// assert_eq!(Health::component_type_id(), Health::component_type_id());
/// ```
pub trait Component: Send + Sync + 'static {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the [`Atom`] identifying this component type.
    ///
    /// The first call for a type allocates from
    /// [`Atom::next_id`]; concurrent first calls agree on a
    /// single winner.
    fn component_type_id() -> Atom {
        type_atom::<Self>()
    }
}

/// Returns the cached atom for `T`, allocating it on first use.
#[must_use]
pub fn type_atom<T: ?Sized + 'static>() -> Atom {
    let key = TypeId::of::<T>();
    if let Some(atom) = COMPONENT_TYPE_IDS.get(&key) {
        return *atom;
    }
    *COMPONENT_TYPE_IDS
        .entry(key)
        .or_insert_with(Atom::next_id)
}

/// Returns the number of component types that have been assigned an atom.
#[must_use]
pub fn registered_type_count() -> usize {
    COMPONENT_TYPE_IDS.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Barrier;

    use super::*;

    struct Health;
    impl Component for Health {}

    struct Velocity;
    impl Component for Velocity {}

    struct Named;
    impl Component for Named {
        fn type_name() -> &'static str {
            "Named"
        }
    }

    #[test]
    fn test_component_type_id_is_stable() {
        let id1 = Health::component_type_id();
        let id2 = Health::component_type_id();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(Health::component_type_id(), Velocity::component_type_id());
    }

    #[test]
    fn test_type_name_defaults_to_rust_path() {
        assert!(Health::type_name().ends_with("Health"));
        assert_eq!(Named::type_name(), "Named");
    }

    #[test]
    fn test_registered_type_count_grows() {
        struct Fresh;
        impl Component for Fresh {}

        let _ = Health::component_type_id();
        let _ = Fresh::component_type_id();
        assert!(registered_type_count() >= 2);
    }

    #[test]
    fn test_concurrent_first_use_agrees() {
        struct Contended;
        impl Component for Contended {}

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    Contended::component_type_id()
                })
            })
            .collect();

        let ids: Vec<Atom> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
