//! Named-variable container held by each snapshot

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};
use crate::core::types::Time;
use crate::state::variable::Variable;

/// Variables of one snapshot, keyed by unique name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    vars: BTreeMap<String, Variable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable; an existing name is never overwritten
    pub fn add_variable(&mut self, var: Variable) -> Result<()> {
        if self.vars.contains_key(var.name()) {
            return Err(EngineError::DuplicateName(var.name().to_string()));
        }
        self.vars.insert(var.name().to_string(), var);
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> Result<&Variable> {
        self.vars
            .get(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn get_variable_mut(&mut self, name: &str) -> Result<&mut Variable> {
        self.vars
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        self.vars
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    /// Variables carrying `tag`
    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Variable> + 'a {
        self.vars.values().filter(move |v| v.has_tag(tag))
    }

    /// Rehome every linear variable to `t`
    pub fn rehome_all(&mut self, t: Time) {
        for var in self.vars.values_mut() {
            var.rehome(t);
        }
    }
}
