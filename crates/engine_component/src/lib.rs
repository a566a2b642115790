//! # engine_component
//!
//! Identity primitives shared by the ECS runtime.
//!
//! This crate provides:
//!
//! - [`Atom`] — opaque, process-unique `u64` identifiers.
//! - [`AtomFactory`] — lock-free, strictly increasing atom source.
//! - [`Component`] trait — the contract all ECS data must satisfy, plus the
//!   per-type atom cache used as a component type tag.

pub mod atom;
pub mod component;

pub use atom::{Atom, AtomFactory};
pub use component::{Component, registered_type_count, type_atom};
