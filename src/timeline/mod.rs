//! Timeline: cached snapshots over an ordered event queue
//!
//! The cache holds snapshots sorted strictly by time, starting at the epoch.
//! Every cached snapshot reflects exactly the events up to its cursor, and
//! after any public operation returns, no event at or before a snapshot's
//! time is left unreplayed. Editing the queue at `t` throws away snapshots
//! after `t` and replays forward from the last one kept. Snapshots at or
//! before `t` survive: a new event at `t` sorts after everything already
//! there, so those snapshots are still correct as "before the new event".
//!
//! Replay stops at the horizon (`max_time`). External events push the
//! horizon out to their own time; derived events (effects, projected ends)
//! do not, so self-perpetuating chains only run as far as someone looks.
//! `state_at` past the horizon extends it on demand.
//!
//! Every mutating operation is atomic: on error the cache, queue, modifiers
//! and horizon are restored to what they were before the call.

pub mod bottleneck;
pub mod event;
pub mod process;
pub mod queue;
pub mod task;

pub use bottleneck::{project_end, ContentionResolver, ProjectedEnd, ThrottleChange, Unthrottled};
pub use event::{Change, Event, LifecycleHooks, NoHooks, Scheduler, TriggerContext, VariableEvent};
pub use process::{EndReason, Process, ProcessEnd};
pub use queue::{EventQueue, Origin, ScheduledEvent};
pub use task::Task;

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::config::{config, EngineConfig};
use crate::core::error::{ensure_finite, EngineError, Result};
use crate::core::types::{EventId, EventKey, Time};
use crate::modifiers::ModifierRegistry;
use crate::state::TimeState;

#[derive(Debug, Clone)]
pub struct Timeline {
    initial: TimeState,
    cache: Vec<TimeState>,
    events: EventQueue,
    modifiers: ModifierRegistry,
    resolver: Arc<dyn ContentionResolver>,
    config: EngineConfig,
    max_time: Time,
}

/// Everything a failed operation must put back
struct Checkpoint {
    cache: Vec<TimeState>,
    events: EventQueue,
    modifiers: ModifierRegistry,
    max_time: Time,
}

impl Timeline {
    /// Timeline whose epoch is the initial snapshot's time
    ///
    /// The initial snapshot should carry no active processes: a process only
    /// gets projected ends when the event that started it is on this timeline.
    pub fn new(initial: TimeState) -> Self {
        let max_time = initial.time();
        Self {
            cache: vec![initial.clone()],
            initial,
            events: EventQueue::new(),
            modifiers: ModifierRegistry::new(),
            resolver: Arc::new(Unthrottled),
            config: config().clone(),
            max_time,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_modifiers(mut self, modifiers: ModifierRegistry) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_resolver(mut self, resolver: impl ContentionResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn epoch(&self) -> Time {
        self.initial.time()
    }

    pub fn max_time(&self) -> Time {
        self.max_time
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn modifiers(&self) -> &ModifierRegistry {
        &self.modifiers
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn initial(&self) -> &TimeState {
        &self.initial
    }

    pub fn cached_states(&self) -> &[TimeState] {
        &self.cache
    }

    /// Index of the last cached snapshot at or before `t`
    fn index_at(&self, t: Time) -> usize {
        self.cache
            .partition_point(|s| s.time() <= t)
            .saturating_sub(1)
    }

    fn check_time(&self, t: Time) -> Result<Time> {
        let t = ensure_finite(t)?;
        if t < self.epoch() {
            return Err(EngineError::TimeOrderViolation {
                requested: t,
                bound: self.epoch(),
            });
        }
        Ok(t)
    }

    /// Snapshot at `t`, copied forward from the nearest earlier one and cached
    pub fn state_at(&mut self, t: Time) -> Result<&TimeState> {
        let t = self.check_time(t)?;
        if t > self.max_time {
            self.checkpointed(|tl| tl.extend_horizon(t))?;
        }

        let mut idx = self.index_at(t);
        if self.cache[idx].time() != t {
            let copy = self.cache[idx].copy(t)?;
            idx += 1;
            self.cache.insert(idx, copy);
        }
        Ok(&self.cache[idx])
    }

    /// Value of one variable at `t`
    pub fn value_at(&mut self, name: &str, t: Time) -> Result<f64> {
        self.state_at(t)?.value(name)
    }

    /// Read-only batch query against the cache; nothing is cached
    ///
    /// Large batches run on the rayon pool. Times past the horizon fail with
    /// `BeyondHorizon` since answering them would need a replay.
    pub fn sample(&self, times: &[Time]) -> Result<Vec<TimeState>> {
        let query = |&t: &Time| -> Result<TimeState> {
            let t = self.check_time(t)?;
            if t > self.max_time {
                return Err(EngineError::BeyondHorizon {
                    requested: t,
                    horizon: self.max_time,
                });
            }
            self.cache[self.index_at(t)].copy(t)
        };

        if times.len() >= self.config.parallel_threshold {
            times.par_iter().map(query).collect()
        } else {
            times.iter().map(query).collect()
        }
    }

    pub fn add_event<E: Event + 'static>(&mut self, event: E, t: Time) -> Result<EventId> {
        self.add_shared(Arc::new(event), t)
    }

    /// Insert an event at `t` and bring every later snapshot up to date
    pub fn add_shared(&mut self, event: Arc<dyn Event>, t: Time) -> Result<EventId> {
        let t = self.check_time(t)?;
        self.checkpointed(|tl| {
            let name = event.name().to_string();
            let key = tl.events.insert(t, event, Origin::External);
            debug!(id = %key.id, name = %name, time = t, "Event added");
            tl.max_time = tl.max_time.max(t);
            tl.invalidate(t)?;
            Ok(key.id)
        })
    }

    /// Remove an event and everything derived from it
    pub fn remove_event(&mut self, id: EventId) -> Result<()> {
        self.checkpointed(|tl| {
            let key = tl
                .events
                .key_of(id)
                .ok_or_else(|| EngineError::NotFound(format!("event {}", id)))?;
            let removed = tl.events.remove(id);

            tl.cache.retain(|s| {
                s.time() < key.time || (s.time() == key.time && s.cursor() < Some(key))
            });
            if tl.cache.is_empty() {
                tl.cache.push(tl.initial.clone());
            }
            info!(id = %id, time = key.time, removed = removed.len(), "Event removed");
            tl.replay_from(key.time)
        })
    }

    /// Player cancellation of the process started by `process` at time `t`
    pub fn cancel(&mut self, process: EventId, t: Time) -> Result<EventId> {
        let definition = self
            .events
            .get(process)
            .map(|e| e.event.clone())
            .filter(|e| e.process().is_some())
            .ok_or_else(|| EngineError::NotFound(format!("process {}", process)))?;
        let end = ProcessEnd::new(process, definition, EndReason::Cancelled);
        self.add_shared(Arc::new(end), t)
    }

    /// Projected end of the process started by `process`, if one is scheduled
    pub fn scheduled_end(&self, process: EventId) -> Option<(Time, EndReason)> {
        self.events
            .pending_end(process, None)
            .map(|(key, reason)| (key.time, reason))
    }

    /// Move the replay horizon; shrinking drops snapshots past it
    pub fn set_max_time(&mut self, t: Time) -> Result<()> {
        let t = self.check_time(t)?;
        self.checkpointed(|tl| {
            if t < tl.max_time {
                tl.max_time = t;
                tl.truncate_after(t);
                Ok(())
            } else {
                tl.extend_horizon(t)
            }
        })
    }

    /// Mutate the modifier context, then replay from `from`
    ///
    /// Processes started before `from` keep the rates they started with.
    pub fn apply_modifiers<R>(
        &mut self,
        from: Time,
        f: impl FnOnce(&mut ModifierRegistry) -> R,
    ) -> Result<R> {
        let from = self.check_time(from)?;
        self.checkpointed(|tl| {
            let out = f(&mut tl.modifiers);
            tl.max_time = tl.max_time.max(from);
            tl.invalidate(from)?;
            Ok(out)
        })
    }

    /// Drop snapshots after `t` and replay from there
    pub fn invalidate_after(&mut self, t: Time) -> Result<()> {
        let t = self.check_time(t)?;
        self.checkpointed(|tl| tl.invalidate(t))
    }

    /// Replay every event from the last snapshot at or before `t0` up to the horizon
    pub fn recompute(&mut self, t0: Time) -> Result<()> {
        let t0 = self.check_time(t0)?;
        self.checkpointed(|tl| tl.replay_from(t0))
    }

    fn checkpointed<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = Checkpoint {
            cache: self.cache.clone(),
            events: self.events.clone(),
            modifiers: self.modifiers.clone(),
            max_time: self.max_time,
        };
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, "Timeline operation failed, state restored");
                self.cache = checkpoint.cache;
                self.events = checkpoint.events;
                self.modifiers = checkpoint.modifiers;
                self.max_time = checkpoint.max_time;
                Err(err)
            }
        }
    }

    fn invalidate(&mut self, t: Time) -> Result<()> {
        self.truncate_after(t);
        self.replay_from(t)
    }

    fn truncate_after(&mut self, t: Time) {
        let keep = self.cache.partition_point(|s| s.time() <= t).max(1);
        self.cache.truncate(keep);
    }

    fn extend_horizon(&mut self, t: Time) -> Result<()> {
        let from = self.max_time;
        self.max_time = t;
        self.replay_from(from)
    }

    /// One replay pass
    fn replay_from(&mut self, t0: Time) -> Result<()> {
        self.truncate_after(t0);
        let anchor = self.cache.len() - 1;
        let mut cursor = self.cache[anchor].cursor();
        self.recompute_bottlenecks(anchor, cursor);

        let limit = self.config.max_replay_steps;
        let mut steps = 0usize;
        while let Some(key) = self.events.next_after(cursor) {
            if key.time > self.max_time {
                break;
            }
            if steps >= limit {
                return Err(EngineError::ReplayLimit(limit));
            }
            steps += 1;
            cursor = Some(key);
            self.trigger(key)?;
        }

        debug!(
            from = t0,
            horizon = self.max_time,
            steps,
            cached = self.cache.len(),
            "Replay pass finished"
        );
        Ok(())
    }

    /// Validate, apply and cache one event, then collect its follow-ups
    fn trigger(&mut self, key: EventKey) -> Result<()> {
        let Some(event) = self.events.get(key.id).map(|e| e.event.clone()) else {
            return Ok(());
        };
        let dropped = self.events.remove_children(key.id);

        let t = key.time;
        let base = &self.cache[self.index_at(t)];
        let mut state = if base.time() == t {
            base.clone()
        } else {
            base.copy(t)?
        };

        if !event.validate(&state, t) {
            debug!(id = %key.id, name = event.name(), time = t, "Event skipped");
            return Ok(());
        }

        state.set_cursor(key);
        let running: Vec<EventId> = state.active_processes().iter().map(|p| p.id).collect();
        let ctx = TriggerContext {
            id: key.id,
            time: t,
            modifiers: &self.modifiers,
            config: &self.config,
        };
        event.on_start_vars(&mut state, &ctx)?;
        for change in self.resolver.resolve(&state) {
            state.set_throttle(change.id, change.throttle)?;
        }
        let idx = self.store(state);

        // Ends projected for processes this event stopped are stale
        for id in running {
            if self.cache[idx].is_active(id) {
                continue;
            }
            while let Some((end, _)) = self.events.pending_end(id, Some(key)) {
                self.events.remove(end.id);
            }
        }
        self.recompute_bottlenecks(idx, Some(key));

        let mut effects = Scheduler::new(key.id, t);
        event.on_start_effects(&mut effects)?;
        let scheduled = effects.len();
        for (index, (time, follow_up)) in effects.into_pending().into_iter().enumerate() {
            self.events.insert_after(
                time,
                follow_up,
                Origin::Effect {
                    parent: key.id,
                    index,
                },
                Some(key),
            );
        }

        debug!(
            id = %key.id,
            name = event.name(),
            time = t,
            dropped,
            scheduled,
            "Event triggered"
        );
        Ok(())
    }

    /// Cache `state` in place of anything at or after its time
    fn store(&mut self, state: TimeState) -> usize {
        let keep = self.cache.partition_point(|s| s.time() < state.time());
        self.cache.truncate(keep);
        self.cache.push(state);
        self.cache.len() - 1
    }

    /// Re-project the end of every process active in snapshot `idx`
    ///
    /// An existing end is kept when it matches the projection within
    /// `time_epsilon`; otherwise it is replaced. Ends never land before the
    /// snapshot's own time.
    fn recompute_bottlenecks(&mut self, idx: usize, cursor: Option<EventKey>) {
        let state = &self.cache[idx];
        let now = state.time();
        let epsilon = self.config.time_epsilon;
        let projections: Vec<(EventId, Option<ProjectedEnd>)> = state
            .active_processes()
            .iter()
            .map(|p| {
                let end = project_end(state, p, epsilon).map(|end| ProjectedEnd {
                    time: end.time.max(now),
                    ..end
                });
                (p.id, end)
            })
            .collect();

        for (process, projected) in projections {
            let existing = self.events.pending_end(process, cursor);
            let unchanged = match (existing, projected) {
                (Some((key, reason)), Some(end)) => {
                    reason == end.reason && (key.time - end.time).abs() <= epsilon
                }
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                continue;
            }

            if let Some((key, _)) = existing {
                self.events.remove(key.id);
            }
            let Some(end) = projected else {
                continue;
            };
            let Some(definition) = self.events.get(process).map(|e| e.event.clone()) else {
                debug!(process = %process, "Active process has no definition, no end scheduled");
                continue;
            };

            let key = self.events.insert_after(
                end.time,
                Arc::new(ProcessEnd::new(process, definition, end.reason)),
                Origin::End {
                    process,
                    reason: end.reason,
                },
                cursor,
            );
            debug!(process = %process, end = %key.id, time = end.time, reason = %end.reason, "End scheduled");
        }
    }
}
