//! Modifier context owned by a timeline
//!
//! Each `Timeline` carries its own `ModifierRegistry`, so independent
//! timelines never see each other's bonuses. Upgrade purchases write here;
//! processes read from here whenever they compute an effective rate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::TagSet;
use crate::modifiers::modifier::{Modifier, TargetParam};
use crate::modifiers::stack::ModifierStack;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierRegistry {
    stack: ModifierStack,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_modifier(&mut self, modifier: Modifier) {
        debug!(
            source = %modifier.source,
            modifier_type = %modifier.modifier_type,
            value = modifier.value,
            param = %modifier.target_param,
            "Modifier added"
        );
        self.stack.add(modifier);
    }

    pub fn remove_modifiers_from(&mut self, source: &str) -> usize {
        let removed = self.stack.remove_by_source(source);
        if removed > 0 {
            debug!(source, removed, "Modifiers removed");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn get_multiplier(&self, param: &TargetParam, tags: &TagSet) -> f64 {
        self.stack.calculate_multiplier(param, tags)
    }

    pub fn get_additive_bonus(&self, param: &TargetParam, tags: &TagSet) -> f64 {
        self.stack.calculate_additive(param, tags)
    }

    pub fn all(&self) -> &[Modifier] {
        self.stack.modifiers()
    }

    pub fn modifiers_for(&self, param: &TargetParam, tags: &TagSet) -> Vec<&Modifier> {
        self.stack.get_modifiers_for(param, tags).collect()
    }

    /// Scale `base` by the multiplier for `param` and `tags`
    pub fn apply(&self, base: f64, param: &TargetParam, tags: &TagSet) -> f64 {
        base * self.get_multiplier(param, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tag_set;

    #[test]
    fn test_registries_are_independent() {
        let mut a = ModifierRegistry::new();
        let b = ModifierRegistry::new();
        a.add_modifier(Modifier::new("axe", "tools", 0.5, TargetParam::Rate));
        assert_eq!(a.get_multiplier(&TargetParam::Rate, &TagSet::new()), 1.5);
        assert_eq!(b.get_multiplier(&TargetParam::Rate, &TagSet::new()), 1.0);
    }

    #[test]
    fn test_apply_scales_base() {
        let mut registry = ModifierRegistry::new();
        registry.add_modifier(
            Modifier::new("furnace", "efficiency", -0.25, TargetParam::Consumed)
                .with_tags(["smelting"]),
        );
        let tags = tag_set(["smelting"]);
        assert_eq!(registry.apply(4.0, &TargetParam::Consumed, &tags), 3.0);
        assert_eq!(registry.apply(4.0, &TargetParam::Produced, &tags), 4.0);
        assert_eq!(registry.modifiers_for(&TargetParam::Consumed, &tags).len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = ModifierRegistry::new();
        registry.add_modifier(Modifier::new("axe", "tools", 0.2, TargetParam::Rate));
        registry.add_modifier(Modifier::new("map", "scouting", 0.1, TargetParam::Rate));
        assert_eq!(registry.remove_modifiers_from("axe"), 1);
        assert_eq!(registry.all().len(), 1);
        registry.clear();
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_matching_modifiers_outlive_the_query_tags() {
        let mut registry = ModifierRegistry::new();
        registry.add_modifier(
            Modifier::new("axe", "tools", 0.5, TargetParam::Rate).with_tags(["gathering"]),
        );
        registry.add_modifier(Modifier::new("sun", "weather", 0.1, TargetParam::Produced));

        let found = {
            let tags = tag_set(["gathering"]);
            registry.modifiers_for(&TargetParam::Rate, &tags)
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "axe");
    }
}
