//! Buying upgrades at a point on a timeline
//!
//! The variable side of a purchase (costs, set/add effects) becomes a
//! [`PurchaseEvent`] on the timeline, so it is replayed like any other edit.
//! Modifiers and unlocks are timeline-wide and are applied once, through
//! `Timeline::apply_modifiers`, invalidating from the purchase time.

use tracing::warn;

use crate::core::error::Result;
use crate::core::types::{EventId, Time};
use crate::state::TimeState;
use crate::timeline::{Change, Event, Timeline, TriggerContext};
use crate::upgrades::definition::{Cost, UpgradeDefinition, UpgradeEffect};
use crate::upgrades::registry::UpgradeRegistry;

/// Deducts an upgrade's costs and applies its variable effects
///
/// Skipped on replay if the costs are no longer affordable at its time.
#[derive(Debug, Clone)]
pub struct PurchaseEvent {
    name: String,
    costs: Vec<Cost>,
    changes: Vec<Change>,
}

impl PurchaseEvent {
    pub fn new(upgrade: &UpgradeDefinition) -> Self {
        let mut changes: Vec<Change> = upgrade
            .costs
            .iter()
            .map(|cost| Change::Add {
                variable: cost.resource.clone(),
                amount: -cost.amount,
            })
            .collect();
        changes.extend(upgrade.effects.iter().filter_map(|effect| match effect {
            UpgradeEffect::SetVariable { variable, value } => Some(Change::Set {
                variable: variable.clone(),
                value: *value,
            }),
            UpgradeEffect::AddVariable { variable, value } => Some(Change::Add {
                variable: variable.clone(),
                amount: *value,
            }),
            _ => None,
        }));

        Self {
            name: format!("purchase_{}", upgrade.name),
            costs: upgrade.costs.clone(),
            changes,
        }
    }
}

impl Event for PurchaseEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, state: &TimeState, t: Time) -> bool {
        self.costs.iter().all(|cost| {
            state
                .variable(&cost.resource)
                .map(|v| v.get(t) >= cost.amount)
                .unwrap_or(false)
        })
    }

    fn on_start_vars(&self, state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        for change in &self.changes {
            change.apply(state)?;
        }
        Ok(())
    }
}

impl UpgradeRegistry {
    /// Purchase `name` at time `t` of `timeline`
    ///
    /// Checked against the snapshot at `t`. On failure nothing is recorded:
    /// both the timeline and this registry are put back as they were.
    pub fn purchase_at(&mut self, name: &str, timeline: &mut Timeline, t: Time) -> Result<EventId> {
        let state = timeline.state_at(t)?;
        self.purchase_gate(name, state, t)?;
        let upgrade = self.get(name)?.clone();

        let saved_timeline = timeline.clone();
        let saved_registry = self.clone();
        let placed = timeline
            .add_event(PurchaseEvent::new(&upgrade), t)
            .and_then(|id| {
                timeline.apply_modifiers(t, |modifiers| self.mark_purchased(&upgrade, modifiers))?;
                Ok(id)
            });
        if let Err(err) = &placed {
            warn!(upgrade = %name, time = t, error = %err, "Purchase rolled back");
            *timeline = saved_timeline;
            *self = saved_registry;
        }
        placed
    }
}
