//! Upgrade catalog plus purchase state

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use tracing::info;

use crate::core::error::{EngineError, Result};
use crate::core::types::Time;
use crate::modifiers::{Modifier, ModifierRegistry};
use crate::state::TimeState;
use crate::upgrades::definition::{
    Prerequisite, PrerequisiteKind, UpgradeDefinition, UpgradeEffect, UpgradeKind, Visibility,
};

/// Registered upgrades and everything purchasing them has unlocked
#[derive(Debug, Clone)]
pub struct UpgradeRegistry {
    upgrades: AHashMap<String, UpgradeDefinition>,
    purchased: AHashSet<String>,
    unlocked_tasks: AHashSet<String>,
    unlocked_resources: AHashSet<String>,
    unlocked_upgrades: AHashSet<String>,
    completed_tasks: AHashSet<String>,
    max_time_multiplier: f64,
    max_parallel_tasks: u32,
}

impl Default for UpgradeRegistry {
    fn default() -> Self {
        Self {
            upgrades: AHashMap::new(),
            purchased: AHashSet::new(),
            unlocked_tasks: AHashSet::new(),
            unlocked_resources: AHashSet::new(),
            unlocked_upgrades: AHashSet::new(),
            completed_tasks: AHashSet::new(),
            max_time_multiplier: 1.0,
            max_parallel_tasks: 1,
        }
    }
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any earlier one with the same name
    pub fn register(&mut self, upgrade: UpgradeDefinition) {
        self.upgrades.insert(upgrade.name.clone(), upgrade);
    }

    pub fn get(&self, name: &str) -> Result<&UpgradeDefinition> {
        self.upgrades
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("upgrade {}", name)))
    }

    pub fn len(&self) -> usize {
        self.upgrades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty()
    }

    /// Upgrades of one kind, sorted by name
    pub fn by_kind(&self, kind: UpgradeKind) -> Vec<&UpgradeDefinition> {
        let mut found: Vec<_> = self.upgrades.values().filter(|u| u.kind == kind).collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn is_purchased(&self, name: &str) -> bool {
        self.purchased.contains(name)
    }

    fn prerequisite_met(&self, prerequisite: &Prerequisite, state: Option<&TimeState>) -> bool {
        match prerequisite.kind {
            PrerequisiteKind::Upgrade | PrerequisiteKind::Research => {
                self.is_purchased(&prerequisite.target)
            }
            PrerequisiteKind::Task => self.completed_tasks.contains(&prerequisite.target),
            PrerequisiteKind::Resource => self.unlocked_resources.contains(&prerequisite.target),
            PrerequisiteKind::Variable => state
                .and_then(|s| s.value(&prerequisite.target).ok())
                .map(|value| value >= prerequisite.value)
                .unwrap_or(false),
        }
    }

    /// All prerequisites met; variable prerequisites need a snapshot to pass
    pub fn check_prerequisites(&self, name: &str, state: Option<&TimeState>) -> Result<bool> {
        let upgrade = self.get(name)?;
        Ok(upgrade
            .prerequisites
            .iter()
            .all(|p| self.prerequisite_met(p, state)))
    }

    /// Every cost affordable from `state` at `t`
    pub fn check_costs(&self, name: &str, state: &TimeState, t: Time) -> Result<bool> {
        Ok(self.unaffordable(self.get(name)?, state, t).is_none())
    }

    fn unaffordable<'a>(
        &self,
        upgrade: &'a UpgradeDefinition,
        state: &TimeState,
        t: Time,
    ) -> Option<&'a str> {
        upgrade
            .costs
            .iter()
            .find(|cost| {
                state
                    .variable(&cost.resource)
                    .map(|v| v.get(t) < cost.amount)
                    .unwrap_or(true)
            })
            .map(|cost| cost.resource.as_str())
    }

    /// Not yet purchased, prerequisites met and costs affordable
    pub fn can_purchase(&self, name: &str, state: &TimeState, t: Time) -> bool {
        self.purchase_gate(name, state, t).is_ok()
    }

    /// Why `name` cannot be bought right now, as a `PurchaseRejected` error
    pub(crate) fn purchase_gate(&self, name: &str, state: &TimeState, t: Time) -> Result<()> {
        let upgrade = self.get(name)?;
        let reject = |reason: String| EngineError::PurchaseRejected {
            name: name.to_string(),
            reason,
        };
        if self.is_purchased(name) {
            return Err(reject("already purchased".into()));
        }
        if !upgrade
            .prerequisites
            .iter()
            .all(|p| self.prerequisite_met(p, Some(state)))
        {
            return Err(reject("prerequisites not met".into()));
        }
        if let Some(resource) = self.unaffordable(upgrade, state, t) {
            return Err(reject(format!("not enough {}", resource)));
        }
        Ok(())
    }

    /// Buy `name` directly on a snapshot: deduct costs, apply every effect
    ///
    /// Variable effects are checked before anything changes, so a missing
    /// target leaves the snapshot, the modifiers and the registry untouched.
    pub fn purchase(
        &mut self,
        name: &str,
        state: &mut TimeState,
        t: Time,
        modifiers: &mut ModifierRegistry,
    ) -> Result<()> {
        self.purchase_gate(name, state, t)?;
        let upgrade = self.get(name)?.clone();

        for effect in &upgrade.effects {
            if let UpgradeEffect::SetVariable { variable, .. }
            | UpgradeEffect::AddVariable { variable, .. } = effect
            {
                state.variable(variable)?;
            }
        }

        for cost in &upgrade.costs {
            let var = state.variable_mut(&cost.resource)?;
            let current = var.get(t);
            var.set(current - cost.amount, t);
        }
        for effect in &upgrade.effects {
            match effect {
                UpgradeEffect::SetVariable { variable, value } => {
                    state.variable_mut(variable)?.set(*value, t);
                }
                UpgradeEffect::AddVariable { variable, value } => {
                    let var = state.variable_mut(variable)?;
                    let current = var.get(t);
                    var.set(current + value, t);
                }
                _ => {}
            }
        }

        self.mark_purchased(&upgrade, modifiers);
        Ok(())
    }

    /// Record a purchase and apply its non-variable effects
    pub(crate) fn mark_purchased(
        &mut self,
        upgrade: &UpgradeDefinition,
        modifiers: &mut ModifierRegistry,
    ) {
        self.purchased.insert(upgrade.name.clone());
        for effect in &upgrade.effects {
            match effect {
                UpgradeEffect::Modifier {
                    modifier_type,
                    value,
                    target_param,
                    target_tags,
                } => {
                    let mut modifier = Modifier::new(
                        upgrade.name.clone(),
                        modifier_type.clone(),
                        *value,
                        target_param.clone(),
                    );
                    modifier.target_tags = target_tags.clone();
                    modifiers.add_modifier(modifier);
                }
                UpgradeEffect::SetVariable { .. } | UpgradeEffect::AddVariable { .. } => {}
                other => self.apply_unlock(other),
            }
        }
        info!(upgrade = %upgrade.name, kind = ?upgrade.kind, "Upgrade purchased");
    }

    /// Unlocks and limit changes; the parts of an effect that outlive a prestige reset
    fn apply_unlock(&mut self, effect: &UpgradeEffect) {
        match effect {
            UpgradeEffect::MaxTimeMultiplier { multiplier } => {
                self.max_time_multiplier *= multiplier;
            }
            UpgradeEffect::ParallelTasks { value } => {
                self.max_parallel_tasks = self.max_parallel_tasks.max(*value);
            }
            UpgradeEffect::UnlockTask { task } => {
                self.unlocked_tasks.insert(task.clone());
            }
            UpgradeEffect::UnlockResource { resource } => {
                self.unlocked_resources.insert(resource.clone());
            }
            UpgradeEffect::UnlockUpgrade { upgrade } => {
                self.unlocked_upgrades.insert(upgrade.clone());
            }
            _ => {}
        }
    }

    /// Visibility without a snapshot; unknown names are simply not visible
    pub fn is_visible(&self, name: &str) -> bool {
        self.visible(name, None)
    }

    /// Visibility with variable prerequisites checked against `state`
    pub fn is_visible_at(&self, name: &str, state: &TimeState) -> bool {
        self.visible(name, Some(state))
    }

    fn visible(&self, name: &str, state: Option<&TimeState>) -> bool {
        let Ok(upgrade) = self.get(name) else {
            return false;
        };
        if self.is_purchased(name) {
            return true;
        }
        match upgrade.visibility {
            Visibility::Always => true,
            Visibility::Prerequisites => upgrade
                .prerequisites
                .iter()
                .all(|p| self.prerequisite_met(p, state)),
            Visibility::Unlocked => self.unlocked_upgrades.contains(name),
        }
    }

    pub fn visible_upgrades(
        &self,
        kind: UpgradeKind,
        state: Option<&TimeState>,
    ) -> Vec<&UpgradeDefinition> {
        self.by_kind(kind)
            .into_iter()
            .filter(|u| self.visible(&u.name, state))
            .collect()
    }

    pub fn mark_task_completed(&mut self, task: impl Into<String>) {
        self.completed_tasks.insert(task.into());
    }

    pub fn is_task_unlocked(&self, task: &str) -> bool {
        self.unlocked_tasks.contains(task)
    }

    pub fn is_resource_unlocked(&self, resource: &str) -> bool {
        self.unlocked_resources.contains(resource)
    }

    pub fn max_time_multiplier(&self) -> f64 {
        self.max_time_multiplier
    }

    pub fn max_parallel_tasks(&self) -> u32 {
        self.max_parallel_tasks
    }

    /// Research upgrades with the names of the upgrades they depend on
    pub fn research_tree(&self) -> Vec<(&UpgradeDefinition, Vec<&str>)> {
        self.by_kind(UpgradeKind::Research)
            .into_iter()
            .map(|u| {
                let parents = u
                    .prerequisites
                    .iter()
                    .filter(|p| p.is_tree_edge())
                    .map(|p| p.target.as_str())
                    .collect();
                (u, parents)
            })
            .collect()
    }

    /// Purchase flag for every registered upgrade
    pub fn purchase_state(&self) -> BTreeMap<String, bool> {
        self.upgrades
            .keys()
            .map(|name| (name.clone(), self.is_purchased(name)))
            .collect()
    }

    /// Restore purchase flags; only the flags, no effects are re-applied
    pub fn load_purchase_state(&mut self, state: &BTreeMap<String, bool>) {
        self.purchased = state
            .iter()
            .filter(|(_, &purchased)| purchased)
            .map(|(name, _)| name.clone())
            .collect();
    }

    /// Forget every purchase and clear `modifiers`
    pub fn reset(&mut self, modifiers: &mut ModifierRegistry) {
        self.purchased.clear();
        self.unlocked_tasks.clear();
        self.unlocked_resources.clear();
        self.unlocked_upgrades.clear();
        self.completed_tasks.clear();
        self.max_time_multiplier = 1.0;
        self.max_parallel_tasks = 1;
        modifiers.clear();
    }

    /// Prestige reset: keep Nexus purchases, drop the rest and their modifiers
    pub fn reset_non_nexus(&mut self, modifiers: &mut ModifierRegistry) {
        let dropped: Vec<String> = self
            .purchased
            .iter()
            .filter(|name| {
                self.upgrades
                    .get(name.as_str())
                    .map(|u| u.kind != UpgradeKind::Nexus)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        for name in &dropped {
            modifiers.remove_modifiers_from(name);
            self.purchased.remove(name);
        }

        self.unlocked_tasks.clear();
        self.unlocked_resources.clear();
        self.unlocked_upgrades.clear();
        self.completed_tasks.clear();
        self.max_time_multiplier = 1.0;
        self.max_parallel_tasks = 1;

        let kept: Vec<UpgradeDefinition> = self
            .purchased
            .iter()
            .filter_map(|name| self.upgrades.get(name).cloned())
            .collect();
        for upgrade in &kept {
            for effect in &upgrade.effects {
                self.apply_unlock(effect);
            }
        }
        info!(dropped = dropped.len(), kept = kept.len(), "Non-nexus upgrades reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::TargetParam;
    use crate::state::Variable;

    fn state() -> TimeState {
        let mut state = TimeState::new(0.0);
        state
            .add_variable(Variable::linear("Wood", 20.0, 0.0, 0.0, 1000.0).unwrap())
            .unwrap();
        state.add_variable(Variable::discrete("Cot", 0.0)).unwrap();
        state
    }

    fn registry() -> UpgradeRegistry {
        let mut registry = UpgradeRegistry::new();
        registry.register(
            UpgradeDefinition::new("basic_tools", UpgradeKind::Regular)
                .costs("Wood", 10.0)
                .with_effect(UpgradeEffect::Modifier {
                    modifier_type: "tools".into(),
                    value: 0.2,
                    target_param: TargetParam::Rate,
                    target_tags: Default::default(),
                })
                .with_effect(UpgradeEffect::UnlockTask {
                    task: "chop".into(),
                }),
        );
        registry.register(
            UpgradeDefinition::new("cot", UpgradeKind::Regular)
                .requires(Prerequisite::upgrade("basic_tools"))
                .costs("Wood", 5.0)
                .with_effect(UpgradeEffect::SetVariable {
                    variable: "Cot".into(),
                    value: 1.0,
                }),
        );
        registry.register(
            UpgradeDefinition::new("longer_days", UpgradeKind::Nexus)
                .with_visibility(Visibility::Always)
                .with_effect(UpgradeEffect::MaxTimeMultiplier { multiplier: 2.0 })
                .with_effect(UpgradeEffect::UnlockResource {
                    resource: "Motes".into(),
                }),
        );
        registry
    }

    #[test]
    fn test_purchase_deducts_and_applies() {
        let mut registry = registry();
        let mut s = state();
        let mut modifiers = ModifierRegistry::new();
        registry.purchase("basic_tools", &mut s, 0.0, &mut modifiers).unwrap();

        assert!(registry.is_purchased("basic_tools"));
        assert_eq!(s.value("Wood").unwrap(), 10.0);
        assert!((modifiers.get_multiplier(&TargetParam::Rate, &Default::default()) - 1.2).abs() < 1e-12);
        assert!(registry.is_task_unlocked("chop"));
    }

    #[test]
    fn test_prerequisites_gate_purchase() {
        let mut registry = registry();
        let mut s = state();
        let mut modifiers = ModifierRegistry::new();
        assert!(!registry.can_purchase("cot", &s, 0.0));
        assert!(matches!(
            registry.purchase("cot", &mut s, 0.0, &mut modifiers),
            Err(EngineError::PurchaseRejected { .. })
        ));
        registry.purchase("basic_tools", &mut s, 0.0, &mut modifiers).unwrap();
        registry.purchase("cot", &mut s, 0.0, &mut modifiers).unwrap();
        assert_eq!(s.value("Cot").unwrap(), 1.0);
        assert_eq!(s.value("Wood").unwrap(), 5.0);
    }

    #[test]
    fn test_cannot_buy_twice_or_unaffordable() {
        let mut registry = registry();
        let mut s = state();
        let mut modifiers = ModifierRegistry::new();
        registry.purchase("basic_tools", &mut s, 0.0, &mut modifiers).unwrap();
        let err = registry.purchase("basic_tools", &mut s, 0.0, &mut modifiers);
        assert!(matches!(err, Err(EngineError::PurchaseRejected { reason, .. }) if reason == "already purchased"));

        s.variable_mut("Wood").unwrap().set(2.0, 0.0);
        assert!(!registry.check_costs("cot", &s, 0.0).unwrap());
    }

    #[test]
    fn test_unknown_upgrade() {
        let registry = registry();
        assert!(!registry.is_visible("dragon"));
        assert!(matches!(registry.get("dragon"), Err(EngineError::NotFound(_))));
        assert!(!registry.can_purchase("dragon", &state(), 0.0));
    }

    #[test]
    fn test_visibility_rules() {
        let mut registry = registry();
        registry.register(
            UpgradeDefinition::new("secret", UpgradeKind::Research)
                .with_visibility(Visibility::Unlocked),
        );
        registry.register(
            UpgradeDefinition::new("lumber_yard", UpgradeKind::Regular)
                .requires(Prerequisite::variable("Wood", 15.0)),
        );
        let s = state();
        assert!(registry.is_visible("basic_tools"));
        assert!(!registry.is_visible("cot"));
        assert!(registry.is_visible("longer_days"));
        assert!(!registry.is_visible("secret"));
        // Variable prerequisites need a snapshot
        assert!(!registry.is_visible("lumber_yard"));
        assert!(registry.is_visible_at("lumber_yard", &s));

        registry.register(
            UpgradeDefinition::new("map", UpgradeKind::Regular).with_effect(
                UpgradeEffect::UnlockUpgrade {
                    upgrade: "secret".into(),
                },
            ),
        );
        let mut s = s;
        registry
            .purchase("map", &mut s, 0.0, &mut ModifierRegistry::new())
            .unwrap();
        assert!(registry.is_visible("secret"));
    }

    #[test]
    fn test_reset_non_nexus_keeps_meta_progress() {
        let mut registry = registry();
        let mut s = state();
        let mut modifiers = ModifierRegistry::new();
        registry.purchase("basic_tools", &mut s, 0.0, &mut modifiers).unwrap();
        registry.purchase("longer_days", &mut s, 0.0, &mut modifiers).unwrap();
        registry.mark_task_completed("chop");
        assert_eq!(registry.max_time_multiplier(), 2.0);

        registry.reset_non_nexus(&mut modifiers);
        assert!(!registry.is_purchased("basic_tools"));
        assert!(registry.is_purchased("longer_days"));
        assert!(modifiers.all().is_empty());
        assert!(!registry.is_task_unlocked("chop"));
        assert!(registry.is_resource_unlocked("Motes"));
        assert_eq!(registry.max_time_multiplier(), 2.0);

        registry.reset(&mut modifiers);
        assert!(!registry.is_purchased("longer_days"));
        assert_eq!(registry.max_time_multiplier(), 1.0);
    }

    #[test]
    fn test_purchase_state_round_trip() {
        let mut registry = registry();
        let mut s = state();
        registry
            .purchase("basic_tools", &mut s, 0.0, &mut ModifierRegistry::new())
            .unwrap();
        let saved = registry.purchase_state();
        assert_eq!(saved.get("basic_tools"), Some(&true));
        assert_eq!(saved.get("cot"), Some(&false));

        let mut fresh = self::registry();
        fresh.load_purchase_state(&saved);
        assert!(fresh.is_purchased("basic_tools"));
        assert!(!fresh.is_purchased("cot"));
    }

    #[test]
    fn test_research_tree_edges() {
        let mut registry = registry();
        registry.register(
            UpgradeDefinition::new("metallurgy", UpgradeKind::Research)
                .requires(Prerequisite::research("smelting"))
                .requires(Prerequisite::variable("Ore", 3.0)),
        );
        let tree = registry.research_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].1, vec!["smelting"]);
    }

    #[test]
    fn test_missing_effect_target_leaves_everything_untouched() {
        let mut registry = registry();
        registry.register(
            UpgradeDefinition::new("table", UpgradeKind::Regular)
                .costs("Wood", 5.0)
                .with_effect(UpgradeEffect::AddVariable {
                    variable: "Table".into(),
                    value: 1.0,
                }),
        );
        let mut s = state();
        let err = registry.purchase("table", &mut s, 0.0, &mut ModifierRegistry::new());
        assert!(matches!(err, Err(EngineError::NotFound(_))));
        assert_eq!(s.value("Wood").unwrap(), 20.0);
        assert!(!registry.is_purchased("table"));
    }
}
