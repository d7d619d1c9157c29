//! Snapshot of the game state at one instant
//!
//! A `TimeState` owns its registry outright: copying one forward produces
//! independent variables, never references into the source snapshot. Active
//! processes are bookkept by value too, including the exact rate deltas they
//! applied, so ending or re-throttling a process can undo them precisely.

use serde::{Deserialize, Serialize};

use crate::core::error::{ensure_finite, EngineError, Result};
use crate::core::types::{EventId, EventKey, TagSet, Time};
use crate::state::registry::Registry;
use crate::state::variable::Variable;

/// A rate applied to one variable by a running process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub variable: String,
    /// Rate at full throttle, modifiers already applied
    pub rate: f64,
}

impl Flow {
    pub fn new(variable: impl Into<String>, rate: f64) -> Self {
        Self {
            variable: variable.into(),
            rate,
        }
    }
}

/// Bookkeeping for a process running in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveProcess {
    /// Event that started the process; identifies its definition on the timeline
    pub id: EventId,
    pub name: String,
    pub started: Time,
    pub tags: TagSet,
    /// Fraction of full rate currently applied, in [0, 1]
    pub throttle: f64,
    pub consumed: Vec<Flow>,
    pub produced: Vec<Flow>,
    /// Progress variable of a task, with its full-throttle progress rate
    pub progress: Option<Flow>,
}

impl ActiveProcess {
    /// Signed full-throttle rate changes this process imposes
    fn deltas(&self) -> impl Iterator<Item = (&str, f64)> {
        let consumed = self.consumed.iter().map(|f| (f.variable.as_str(), -f.rate));
        let produced = self.produced.iter().map(|f| (f.variable.as_str(), f.rate));
        let progress = self.progress.iter().map(|f| (f.variable.as_str(), f.rate));
        consumed.chain(produced).chain(progress)
    }

    /// Effective (throttled) consumption rate of `variable`, zero if not consumed
    pub fn consumption_of(&self, variable: &str) -> f64 {
        self.consumed
            .iter()
            .filter(|f| f.variable == variable)
            .map(|f| f.rate * self.throttle)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeState {
    time: Time,
    registry: Registry,
    active_processes: Vec<ActiveProcess>,
    /// Key of the last event whose effects this snapshot reflects
    cursor: Option<EventKey>,
}

impl TimeState {
    pub fn new(t: Time) -> Self {
        Self {
            time: t,
            registry: Registry::new(),
            active_processes: Vec::new(),
            cursor: None,
        }
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn cursor(&self) -> Option<EventKey> {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, cursor: EventKey) {
        self.cursor = Some(cursor);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn add_variable(&mut self, var: Variable) -> Result<()> {
        self.registry.add_variable(var)
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.registry.get_variable(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        self.registry.get_variable_mut(name)
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        self.registry.remove_variable(name)
    }

    /// Value of `name` at this snapshot's own time
    pub fn value(&self, name: &str) -> Result<f64> {
        Ok(self.registry.get_variable(name)?.get(self.time))
    }

    /// Add `delta` to a variable's value at this snapshot's time
    pub fn add_to(&mut self, name: &str, delta: f64) -> Result<()> {
        let t = self.time;
        let var = self.registry.get_variable_mut(name)?;
        let current = var.get(t);
        var.set(current + delta, t);
        Ok(())
    }

    pub fn active_processes(&self) -> &[ActiveProcess] {
        &self.active_processes
    }

    pub fn active(&self, id: EventId) -> Option<&ActiveProcess> {
        self.active_processes.iter().find(|p| p.id == id)
    }

    pub fn is_active(&self, id: EventId) -> bool {
        self.active(id).is_some()
    }

    /// Whether a process with this name is running
    pub fn is_running(&self, name: &str) -> bool {
        self.active_processes.iter().any(|p| p.name == name)
    }

    /// Register a process and apply its throttled rates
    pub fn start_process(&mut self, process: ActiveProcess) -> Result<()> {
        if self.is_active(process.id) {
            return Err(EngineError::DuplicateName(process.name));
        }
        self.apply_deltas(&process, process.throttle)?;
        self.active_processes.push(process);
        Ok(())
    }

    /// Stop a process: revert its rates and drop its progress variable
    pub fn end_process(&mut self, id: EventId) -> Result<ActiveProcess> {
        let idx = self
            .active_processes
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("active process {}", id)))?;
        let process = self.active_processes.remove(idx);

        let t = self.time;
        for flow in &process.consumed {
            self.registry
                .get_variable_mut(&flow.variable)?
                .adjust_rate(flow.rate * process.throttle, t)?;
        }
        for flow in &process.produced {
            self.registry
                .get_variable_mut(&flow.variable)?
                .adjust_rate(-flow.rate * process.throttle, t)?;
        }
        if let Some(progress) = &process.progress {
            self.registry.remove_variable(&progress.variable)?;
        }
        Ok(process)
    }

    /// Change a running process's throttle, re-applying its rates
    pub fn set_throttle(&mut self, id: EventId, throttle: f64) -> Result<()> {
        let throttle = throttle.clamp(0.0, 1.0);
        let process = self
            .active(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("active process {}", id)))?;
        self.apply_deltas(&process, throttle - process.throttle)?;
        if let Some(p) = self.active_processes.iter_mut().find(|p| p.id == id) {
            p.throttle = throttle;
        }
        Ok(())
    }

    fn apply_deltas(&mut self, process: &ActiveProcess, scale: f64) -> Result<()> {
        for (name, _) in process.deltas() {
            let var = self.registry.get_variable(name)?;
            if !var.is_linear() {
                return Err(EngineError::NotLinear(name.to_string()));
            }
        }
        let t = self.time;
        for (name, delta) in process.deltas() {
            self.registry
                .get_variable_mut(name)?
                .adjust_rate(delta * scale, t)?;
        }
        Ok(())
    }

    /// Independent copy moved forward to `t`, linear variables rehomed there
    pub fn copy(&self, t: Time) -> Result<TimeState> {
        ensure_finite(t)?;
        if t < self.time {
            return Err(EngineError::TimeOrderViolation {
                requested: t,
                bound: self.time,
            });
        }
        let mut next = self.clone();
        next.time = t;
        next.registry.rehome_all(t);
        Ok(next)
    }
}
