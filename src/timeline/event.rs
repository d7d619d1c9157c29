//! Event capability set and the hooks the timeline calls while replaying
//!
//! An event never drives the replay itself. The timeline validates it against
//! the snapshot at its trigger time, hands it a working copy to mutate
//! through `on_start_vars`, caches that copy, then collects any follow-up
//! events from `on_start_effects` through a [`Scheduler`]. Follow-ups are
//! queued into the pass that is already running instead of triggering a
//! nested recompute.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::error::{ensure_finite, EngineError, Result};
use crate::core::types::{EventId, Time};
use crate::modifiers::ModifierRegistry;
use crate::state::TimeState;
use crate::timeline::process::Process;
use crate::timeline::task::Task;

/// Read-only context available while an event mutates its snapshot
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    /// Identity of the event being triggered
    pub id: EventId,
    pub time: Time,
    pub modifiers: &'a ModifierRegistry,
    pub config: &'a EngineConfig,
}

/// Pending insertions collected from `on_start_effects`
///
/// Everything scheduled here is queued as a child of the triggering event,
/// so replaying or removing the parent also discards what it scheduled.
#[derive(Debug)]
pub struct Scheduler {
    parent: EventId,
    now: Time,
    pending: Vec<(Time, Arc<dyn Event>)>,
}

impl Scheduler {
    pub(crate) fn new(parent: EventId, now: Time) -> Self {
        Self {
            parent,
            now,
            pending: Vec::new(),
        }
    }

    /// Trigger time of the event doing the scheduling
    pub fn now(&self) -> Time {
        self.now
    }

    pub fn parent(&self) -> EventId {
        self.parent
    }

    /// Queue `event` at `t`; effects may not reach back before the present
    pub fn schedule(&mut self, event: Arc<dyn Event>, t: Time) -> Result<()> {
        let t = ensure_finite(t)?;
        if t < self.now {
            return Err(EngineError::TimeOrderViolation {
                requested: t,
                bound: self.now,
            });
        }
        self.pending.push((t, event));
        Ok(())
    }

    pub fn schedule_after(&mut self, event: Arc<dyn Event>, delay: Time) -> Result<()> {
        self.schedule(event, self.now + delay)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn into_pending(self) -> Vec<(Time, Arc<dyn Event>)> {
        self.pending
    }
}

/// A unit of state mutation placed on a timeline
pub trait Event: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether the event applies to `state` at `t`; false skips it silently
    fn validate(&self, _state: &TimeState, _t: Time) -> bool {
        true
    }

    /// Mutate the snapshot at the trigger time
    fn on_start_vars(&self, _state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Schedule follow-up events
    fn on_start_effects(&self, _effects: &mut Scheduler) -> Result<()> {
        Ok(())
    }

    /// Process definition, when this event starts one
    fn process(&self) -> Option<&Process> {
        None
    }

    /// Task definition, when this event starts one
    fn task(&self) -> Option<&Task> {
        None
    }
}

/// Content-supplied behavior attached to a process or task
///
/// Every method defaults to a no-op. The finish hooks only run when a task
/// completes; interrupted or cancelled tasks skip them.
pub trait LifecycleHooks: Debug + Send + Sync {
    fn validate(&self, _state: &TimeState, _t: Time) -> bool {
        true
    }

    fn on_start_vars(&self, _state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_start_effects(&self, _effects: &mut Scheduler) -> Result<()> {
        Ok(())
    }

    fn on_finish_vars(&self, _state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_finish_effects(&self, _effects: &mut Scheduler) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// One direct variable mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    Add { variable: String, amount: f64 },
    Set { variable: String, value: f64 },
    AdjustRate { variable: String, delta: f64 },
}

impl Change {
    pub fn apply(&self, state: &mut TimeState) -> Result<()> {
        let t = state.time();
        match self {
            Change::Add { variable, amount } => state.add_to(variable, *amount),
            Change::Set { variable, value } => {
                state.variable_mut(variable)?.set(*value, t);
                Ok(())
            }
            Change::AdjustRate { variable, delta } => {
                state.variable_mut(variable)?.adjust_rate(*delta, t)
            }
        }
    }
}

/// Instantaneous event applying a list of variable changes
///
/// A missing variable is an error, not a validation failure: it aborts the
/// replay pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEvent {
    name: String,
    changes: Vec<Change>,
}

impl VariableEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
        }
    }

    pub fn add(mut self, variable: impl Into<String>, amount: f64) -> Self {
        self.changes.push(Change::Add {
            variable: variable.into(),
            amount,
        });
        self
    }

    pub fn set(mut self, variable: impl Into<String>, value: f64) -> Self {
        self.changes.push(Change::Set {
            variable: variable.into(),
            value,
        });
        self
    }

    pub fn adjust_rate(mut self, variable: impl Into<String>, delta: f64) -> Self {
        self.changes.push(Change::AdjustRate {
            variable: variable.into(),
            delta,
        });
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }
}

impl Event for VariableEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start_vars(&self, state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        for change in &self.changes {
            change.apply(state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Variable;

    fn ctx<'a>(modifiers: &'a ModifierRegistry, config: &'a EngineConfig) -> TriggerContext<'a> {
        TriggerContext {
            id: EventId(0),
            time: 2.0,
            modifiers,
            config,
        }
    }

    #[test]
    fn test_scheduler_rejects_past() {
        let mut scheduler = Scheduler::new(EventId(3), 5.0);
        let event: Arc<dyn Event> = Arc::new(VariableEvent::new("noop"));
        assert!(matches!(
            scheduler.schedule(event.clone(), 4.0),
            Err(EngineError::TimeOrderViolation { .. })
        ));
        assert!(matches!(
            scheduler.schedule(event.clone(), f64::NAN),
            Err(EngineError::InvalidTime(_))
        ));
        scheduler.schedule(event.clone(), 5.0).unwrap();
        scheduler.schedule_after(event, 2.5).unwrap();
        let times: Vec<_> = scheduler.into_pending().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![5.0, 7.5]);
    }

    #[test]
    fn test_variable_event_changes() {
        let mut state = TimeState::new(2.0);
        state
            .add_variable(Variable::linear("Wood", 10.0, 0.0, 0.0, 100.0).unwrap())
            .unwrap();
        state.add_variable(Variable::discrete("Cot", 0.0)).unwrap();

        let event = VariableEvent::new("delivery")
            .add("Wood", 5.0)
            .set("Cot", 1.0)
            .adjust_rate("Wood", 2.0);
        let modifiers = ModifierRegistry::new();
        let config = EngineConfig::default();
        event.on_start_vars(&mut state, &ctx(&modifiers, &config)).unwrap();

        assert_eq!(state.value("Wood").unwrap(), 15.0);
        assert_eq!(state.value("Cot").unwrap(), 1.0);
        assert_eq!(state.variable("Wood").unwrap().rate(), 2.0);
    }

    #[test]
    fn test_variable_event_missing_variable_errors() {
        let mut state = TimeState::new(0.0);
        let modifiers = ModifierRegistry::new();
        let config = EngineConfig::default();
        let event = VariableEvent::new("ghost").add("Stone", 1.0);
        assert!(matches!(
            event.on_start_vars(&mut state, &ctx(&modifiers, &config)),
            Err(EngineError::NotFound(_))
        ));
    }
}
