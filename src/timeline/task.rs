//! Bounded-duration processes with a progress variable

use std::sync::Arc;

use crate::core::config::config;
use crate::core::error::Result;
use crate::core::types::{TagSet, Time};
use crate::modifiers::{ModifierRegistry, TargetParam};
use crate::state::{Flow, TimeState, Variable};
use crate::timeline::event::{Event, LifecycleHooks, Scheduler, TriggerContext};
use crate::timeline::process::Process;

/// A process that completes once `work` units have been done at `rate`
///
/// On start it creates a linear progress variable in [0, 1] that rises at
/// `rate * multiplier(rate, tags) / work`. The timeline ends the task with
/// `Completed` when progress reaches 1, or `Interrupted` if a consumed
/// variable depletes first. Only completion runs the finish hooks.
#[derive(Debug, Clone)]
pub struct Task {
    process: Process,
    work: f64,
    rate: f64,
    progress_variable: String,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_process(Process::new(name))
    }

    /// Wrap a process definition; the progress variable takes the configured suffix
    pub fn from_process(process: Process) -> Self {
        let progress_variable = format!("{}{}", process.name(), config().progress_suffix);
        Self {
            process,
            work: 1.0,
            rate: 1.0,
            progress_variable,
        }
    }

    /// Units of work to complete; non-positive amounts are raised to the smallest positive work
    pub fn with_work(mut self, work: f64) -> Self {
        self.work = work.max(f64::EPSILON);
        self
    }

    /// Work done per time unit before modifiers
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_progress_variable(mut self, name: impl Into<String>) -> Self {
        self.progress_variable = name.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.process = self.process.with_display_name(display_name);
        self
    }

    pub fn consumes(mut self, variable: impl Into<String>, rate: f64) -> Self {
        self.process = self.process.consumes(variable, rate);
        self
    }

    pub fn produces(mut self, variable: impl Into<String>, rate: f64) -> Self {
        self.process = self.process.produces(variable, rate);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process = self.process.with_tags(tags);
        self
    }

    pub fn with_throttle(mut self, throttle: f64) -> Self {
        self.process = self.process.with_throttle(throttle);
        self
    }

    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.process = self.process.with_hooks(hooks);
        self
    }

    pub fn with_shared_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.process = self.process.with_shared_hooks(hooks);
        self
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn work(&self) -> f64 {
        self.work
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn tags(&self) -> &TagSet {
        self.process.tags()
    }

    pub fn hooks(&self) -> &dyn LifecycleHooks {
        self.process.hooks()
    }

    pub fn progress_variable(&self) -> &str {
        &self.progress_variable
    }

    /// Full-throttle progress per time unit
    pub fn progress_rate(&self, modifiers: &ModifierRegistry) -> f64 {
        self.rate * modifiers.get_multiplier(&TargetParam::Rate, self.process.tags()) / self.work
    }

    /// Time a fresh start would take to complete, or None if it never progresses
    pub fn duration(&self, modifiers: &ModifierRegistry) -> Option<Time> {
        let rate = self.progress_rate(modifiers) * self.process.throttle();
        (rate > 0.0).then(|| 1.0 / rate)
    }
}

impl Event for Task {
    fn name(&self) -> &str {
        self.process.name()
    }

    fn validate(&self, state: &TimeState, t: Time) -> bool {
        !state.registry().contains(&self.progress_variable) && self.process.validate_start(state, t)
    }

    fn on_start_vars(&self, state: &mut TimeState, ctx: &TriggerContext<'_>) -> Result<()> {
        let progress = Variable::linear(self.progress_variable.clone(), 0.0, 0.0, 0.0, 1.0)?
            .starting_at(ctx.time)
            .with_tags(["progress"]);
        state.add_variable(progress)?;

        let flow = Flow::new(
            self.progress_variable.clone(),
            self.progress_rate(ctx.modifiers),
        );
        state.start_process(self.process.activate(ctx, Some(flow)))?;
        self.process.hooks().on_start_vars(state, ctx)
    }

    fn on_start_effects(&self, effects: &mut Scheduler) -> Result<()> {
        self.process.hooks().on_start_effects(effects)
    }

    fn process(&self) -> Option<&Process> {
        Some(&self.process)
    }

    fn task(&self) -> Option<&Task> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::types::EventId;
    use crate::modifiers::Modifier;

    fn state() -> TimeState {
        let mut state = TimeState::new(0.0);
        state
            .add_variable(Variable::linear("Stamina", 100.0, 0.0, 0.0, 100.0).unwrap())
            .unwrap();
        state
    }

    #[test]
    fn test_progress_rate_and_duration() {
        let mut modifiers = ModifierRegistry::new();
        let task = Task::new("gather").with_work(10.0).with_tags(["gathering"]);
        assert!((task.progress_rate(&modifiers) - 0.1).abs() < 1e-12);
        assert!((task.duration(&modifiers).unwrap() - 10.0).abs() < 1e-9);

        modifiers.add_modifier(
            Modifier::new("axe", "tools", 1.0, TargetParam::Rate).with_tags(["gathering"]),
        );
        assert!((task.duration(&modifiers).unwrap() - 5.0).abs() < 1e-9);
        assert!(task.clone().with_rate(0.0).duration(&modifiers).is_none());
    }

    #[test]
    fn test_start_creates_progress_variable() {
        let modifiers = ModifierRegistry::new();
        let config = EngineConfig::default();
        let ctx = TriggerContext {
            id: EventId(2),
            time: 3.0,
            modifiers: &modifiers,
            config: &config,
        };
        let task = Task::new("gather").with_work(10.0).consumes("Stamina", 1.0);
        let mut s = state().copy(3.0).unwrap();
        assert!(task.validate(&s, 3.0));
        task.on_start_vars(&mut s, &ctx).unwrap();

        let progress = s.variable("gather_progress").unwrap();
        assert_eq!(progress.get(3.0), 0.0);
        assert!((progress.get(8.0) - 0.5).abs() < 1e-12);
        assert!((progress.when(1.0).unwrap() - 13.0).abs() < 1e-9);
        assert!(!task.validate(&s, 4.0));
    }

    #[test]
    fn test_task_exposes_both_capabilities() {
        let task = Task::new("gather");
        let event: &dyn Event = &task;
        assert!(event.task().is_some());
        assert_eq!(event.process().map(|p| p.name()), Some("gather"));
        assert_eq!(task.progress_variable(), "gather_progress");
    }
}
