//! Contention between running processes and projection of their end times

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::core::types::{EventId, Time};
use crate::state::{ActiveProcess, TimeState};
use crate::timeline::process::EndReason;

/// New throttle for one active process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleChange {
    pub id: EventId,
    pub throttle: f64,
}

/// Resolves resource contention among active processes
///
/// Invoked once per replay step with the working snapshot, after the
/// triggering event applied its changes and before the snapshot is cached.
/// Returned throttles are clamped to [0, 1] when applied.
pub trait ContentionResolver: Debug + Send + Sync {
    fn resolve(&self, state: &TimeState) -> Vec<ThrottleChange>;
}

/// Identity resolver: every process runs at its requested throttle
#[derive(Debug, Clone, Copy, Default)]
pub struct Unthrottled;

impl ContentionResolver for Unthrottled {
    fn resolve(&self, _state: &TimeState) -> Vec<ThrottleChange> {
        Vec::new()
    }
}

/// When and why an active process will stop if nothing else changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedEnd {
    pub time: Time,
    pub reason: EndReason,
}

/// Earliest time a consumed variable of `process` bottoms out
///
/// Only variables whose net rate falls faster than `epsilon` can deplete.
pub fn depletion_time(state: &TimeState, process: &ActiveProcess, epsilon: f64) -> Option<Time> {
    process
        .consumed
        .iter()
        .filter_map(|flow| state.variable(&flow.variable).ok()?.as_linear())
        .filter(|linear| linear.rate() < -epsilon)
        .filter_map(|linear| linear.when(linear.min()))
        .min_by(f64::total_cmp)
}

/// Time a task's progress variable reaches 1
pub fn completion_time(state: &TimeState, process: &ActiveProcess) -> Option<Time> {
    let flow = process.progress.as_ref()?;
    state.variable(&flow.variable).ok()?.as_linear()?.when(1.0)
}

/// Project the end of `process`: completion wins ties with depletion
pub fn project_end(state: &TimeState, process: &ActiveProcess, epsilon: f64) -> Option<ProjectedEnd> {
    let depletion = depletion_time(state, process, epsilon);
    if process.progress.is_none() {
        return depletion.map(|time| ProjectedEnd {
            time,
            reason: EndReason::Depleted,
        });
    }

    match (completion_time(state, process), depletion) {
        (Some(done), Some(dry)) if done > dry => Some(ProjectedEnd {
            time: dry,
            reason: EndReason::Interrupted,
        }),
        (Some(done), _) => Some(ProjectedEnd {
            time: done,
            reason: EndReason::Completed,
        }),
        (None, Some(dry)) => Some(ProjectedEnd {
            time: dry,
            reason: EndReason::Interrupted,
        }),
        (None, None) => None,
    }
}
