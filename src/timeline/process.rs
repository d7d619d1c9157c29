//! Continuous resource conversion and the events that end it

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{EventId, TagSet, Time};
use crate::modifiers::{ModifierRegistry, TargetParam};
use crate::state::{ActiveProcess, Flow, TimeState};
use crate::timeline::event::{Event, LifecycleHooks, NoHooks, Scheduler, TriggerContext};

/// A process converting consumed variables into produced ones at fixed rates
///
/// Starting a process applies its modified rates to the snapshot; the
/// timeline then projects when it must end (earliest depletion of a consumed
/// variable) and keeps that projection current as other events land.
#[derive(Debug, Clone)]
pub struct Process {
    name: String,
    display_name: Option<String>,
    consumed: Vec<Flow>,
    produced: Vec<Flow>,
    throttle: f64,
    tags: TagSet,
    hooks: Arc<dyn LifecycleHooks>,
}

impl Process {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            consumed: Vec::new(),
            produced: Vec::new(),
            throttle: 1.0,
            tags: TagSet::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Consume `variable` at `rate` per time unit (rate given as a positive number)
    pub fn consumes(mut self, variable: impl Into<String>, rate: f64) -> Self {
        self.consumed.push(Flow::new(variable, rate));
        self
    }

    pub fn produces(mut self, variable: impl Into<String>, rate: f64) -> Self {
        self.produced.push(Flow::new(variable, rate));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_throttle(mut self, throttle: f64) -> Self {
        self.throttle = throttle.clamp(0.0, 1.0);
        self
    }

    pub fn with_hooks(self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.with_shared_hooks(Arc::new(hooks))
    }

    pub fn with_shared_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn consumed(&self) -> &[Flow] {
        &self.consumed
    }

    pub fn produced(&self) -> &[Flow] {
        &self.produced
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn hooks(&self) -> &dyn LifecycleHooks {
        self.hooks.as_ref()
    }

    /// Effective rate: `base * throttle * multiplier(param, tags)`
    pub fn get_modified_rate(
        &self,
        param: &TargetParam,
        base: f64,
        modifiers: &ModifierRegistry,
    ) -> f64 {
        base * self.throttle * modifiers.get_multiplier(param, &self.tags)
    }

    /// Name must be free, every consumed variable above its minimum and
    /// every touched variable linear
    pub(crate) fn validate_start(&self, state: &TimeState, t: Time) -> bool {
        if state.is_running(&self.name) {
            return false;
        }
        for flow in &self.consumed {
            match state.variable(&flow.variable).ok().and_then(|v| v.as_linear()) {
                Some(linear) if linear.get(t) > linear.min() => {}
                _ => return false,
            }
        }
        let produced_ok = self.produced.iter().all(|flow| {
            state
                .variable(&flow.variable)
                .map(|v| v.is_linear())
                .unwrap_or(false)
        });
        produced_ok && self.hooks.validate(state, t)
    }

    /// Bookkeeping entry with full-throttle modified rates
    pub(crate) fn activate(&self, ctx: &TriggerContext<'_>, progress: Option<Flow>) -> ActiveProcess {
        let consumed_mult = ctx
            .modifiers
            .get_multiplier(&TargetParam::Consumed, &self.tags);
        let produced_mult = ctx
            .modifiers
            .get_multiplier(&TargetParam::Produced, &self.tags);

        ActiveProcess {
            id: ctx.id,
            name: self.name.clone(),
            started: ctx.time,
            tags: self.tags.clone(),
            throttle: self.throttle,
            consumed: self
                .consumed
                .iter()
                .map(|f| Flow::new(f.variable.clone(), f.rate * consumed_mult))
                .collect(),
            produced: self
                .produced
                .iter()
                .map(|f| Flow::new(f.variable.clone(), f.rate * produced_mult))
                .collect(),
            progress,
        }
    }
}

impl Event for Process {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, state: &TimeState, t: Time) -> bool {
        self.validate_start(state, t)
    }

    fn on_start_vars(&self, state: &mut TimeState, ctx: &TriggerContext<'_>) -> Result<()> {
        state.start_process(self.activate(ctx, None))?;
        self.hooks.on_start_vars(state, ctx)
    }

    fn on_start_effects(&self, effects: &mut Scheduler) -> Result<()> {
        self.hooks.on_start_effects(effects)
    }

    fn process(&self) -> Option<&Process> {
        Some(self)
    }
}

/// Why a running process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A consumed variable hit its minimum
    Depleted,
    /// Task progress reached 1
    Completed,
    /// A task's consumed variable ran out before completion
    Interrupted,
    /// Player stopped it
    Cancelled,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndReason::Depleted => "depleted",
            EndReason::Completed => "completed",
            EndReason::Interrupted => "interrupted",
            EndReason::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Slack accepted on task progress when validating a completion
const COMPLETION_TOLERANCE: f64 = 1e-6;

/// Stops the process started by event `process`
#[derive(Debug, Clone)]
pub struct ProcessEnd {
    name: String,
    process: EventId,
    definition: Arc<dyn Event>,
    reason: EndReason,
}

impl ProcessEnd {
    pub fn new(process: EventId, definition: Arc<dyn Event>, reason: EndReason) -> Self {
        Self {
            name: format!("{}:{}", definition.name(), reason),
            process,
            definition,
            reason,
        }
    }

    pub fn process_id(&self) -> EventId {
        self.process
    }

    pub fn reason(&self) -> EndReason {
        self.reason
    }

    pub fn definition(&self) -> &Arc<dyn Event> {
        &self.definition
    }

    fn finishing_hooks(&self) -> Option<&dyn LifecycleHooks> {
        if self.reason != EndReason::Completed {
            return None;
        }
        self.definition.task().map(|task| task.hooks())
    }
}

impl Event for ProcessEnd {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, state: &TimeState, t: Time) -> bool {
        let Some(active) = state.active(self.process) else {
            return false;
        };
        if self.reason != EndReason::Completed {
            return true;
        }
        match &active.progress {
            Some(flow) => state
                .variable(&flow.variable)
                .map(|v| v.get(t) >= 1.0 - COMPLETION_TOLERANCE)
                .unwrap_or(false),
            None => false,
        }
    }

    fn on_start_vars(&self, state: &mut TimeState, ctx: &TriggerContext<'_>) -> Result<()> {
        state.end_process(self.process)?;
        if let Some(hooks) = self.finishing_hooks() {
            hooks.on_finish_vars(state, ctx)?;
        }
        Ok(())
    }

    fn on_start_effects(&self, effects: &mut Scheduler) -> Result<()> {
        match self.finishing_hooks() {
            Some(hooks) => hooks.on_finish_effects(effects),
            None => Ok(()),
        }
    }
}
