//! Timescrubber - Time-indexed state engine for a non-linear idle game
//!
//! Game state is a function of time. Edits anywhere on the timeline
//! invalidate later snapshots, which are recomputed deterministically by
//! replaying the event queue.

pub mod content;
pub mod core;
pub mod modifiers;
pub mod state;
pub mod timeline;
pub mod upgrades;
