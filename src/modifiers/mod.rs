//! Stacking bonuses: additive within a type, multiplicative across types

pub mod modifier;
pub mod registry;
pub mod stack;

pub use modifier::{Modifier, TargetParam};
pub use registry::ModifierRegistry;
pub use stack::ModifierStack;
