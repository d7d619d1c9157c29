//! Snapshot data model: variables, their registry and time-stamped states

pub mod registry;
pub mod time_state;
pub mod variable;

pub use registry::Registry;
pub use time_state::{ActiveProcess, Flow, TimeState};
pub use variable::{Linear, Variable, VariableKind};
