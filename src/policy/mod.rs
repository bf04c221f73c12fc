//! A/B group assignment and persona selection.

pub mod ab;
pub mod blender;
pub mod persona;

pub use ab::{AbGroup, PolicyError, PolicySet, ab_group, hash_bucket};
pub use blender::Blender;
pub use persona::Persona;
