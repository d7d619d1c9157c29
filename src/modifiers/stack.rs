//! Ordered collection of modifiers with grouped multiplier evaluation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::TagSet;
use crate::modifiers::modifier::{Modifier, TargetParam};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierStack {
    modifiers: Vec<Modifier>,
}

impl ModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, modifier: Modifier) {
        self.modifiers.push(modifier);
    }

    /// Drop every modifier contributed by `source`, returning how many went
    pub fn remove_by_source(&mut self, source: &str) -> usize {
        let before = self.modifiers.len();
        self.modifiers.retain(|m| m.source != source);
        before - self.modifiers.len()
    }

    pub fn clear(&mut self) {
        self.modifiers.clear();
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Modifiers that apply to `param` and `tags`
    ///
    /// The items borrow from the stack alone, so they outlive the query keys.
    pub fn get_modifiers_for<'a, 'q>(
        &'a self,
        param: &'q TargetParam,
        tags: &'q TagSet,
    ) -> impl Iterator<Item = &'a Modifier> + 'q
    where
        'a: 'q,
    {
        self.modifiers
            .iter()
            .filter(move |m| m.applies_to(param, tags))
    }

    /// Product over modifier types of `1 + sum(values of that type)`
    ///
    /// Group values are summed in sorted order, so the result does not depend
    /// on the order modifiers were added in, down to the last bit.
    pub fn calculate_multiplier(&self, param: &TargetParam, tags: &TagSet) -> f64 {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for m in self.get_modifiers_for(param, tags) {
            groups.entry(m.modifier_type.as_str()).or_default().push(m.value);
        }

        groups
            .into_values()
            .map(|mut values| {
                values.sort_by(f64::total_cmp);
                1.0 + values.iter().sum::<f64>()
            })
            .product()
    }

    /// Flat sum of every matching value, ignoring type groups
    pub fn calculate_additive(&self, param: &TargetParam, tags: &TagSet) -> f64 {
        let mut values: Vec<f64> = self
            .get_modifiers_for(param, tags)
            .map(|m| m.value)
            .collect();
        values.sort_by(f64::total_cmp);
        values.iter().sum()
    }
}
