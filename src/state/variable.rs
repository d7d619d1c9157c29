//! Scalar variables: constant-until-set and linear-in-time with clamped bounds

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};
use crate::core::types::{TagSet, Time};

/// Linear value with a reference point, a rate and clamping bounds
///
/// `get(t) = clamp((t - t0) * rate + value, min, max)`. The stored value is
/// always inside `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    t0: Time,
    value: f64,
    rate: f64,
    min: f64,
    max: f64,
}

impl Linear {
    /// Create a linear value referenced at t = 0
    ///
    /// Returns None when `min > max` or a bound is NaN.
    pub fn new(value: f64, rate: f64, min: f64, max: f64) -> Option<Self> {
        if !(min <= max) {
            return None;
        }
        Some(Self {
            t0: 0.0,
            value: value.clamp(min, max),
            rate,
            min,
            max,
        })
    }

    pub fn t0(&self) -> Time {
        self.t0
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Stored value at the reference time
    pub fn reference_value(&self) -> f64 {
        self.value
    }

    pub fn get(&self, t: Time) -> f64 {
        ((t - self.t0) * self.rate + self.value).clamp(self.min, self.max)
    }

    /// Replace the value and move the reference point to `t`
    pub fn set(&mut self, x: f64, t: Time) {
        self.value = x.clamp(self.min, self.max);
        self.t0 = t;
    }

    /// Move the reference point to `t` without changing the observed value there
    pub fn rehome(&mut self, t: Time) {
        self.value = self.get(t);
        self.t0 = t;
    }

    /// Rehome to `t`, then replace the rate
    pub fn set_rate(&mut self, rate: f64, t: Time) {
        self.rehome(t);
        self.rate = rate;
    }

    /// Rehome to `t`, then add `delta` to the rate
    pub fn adjust_rate(&mut self, delta: f64, t: Time) {
        self.rehome(t);
        self.rate += delta;
    }

    /// Earliest time at or after `t0` at which `get` returns `target`
    ///
    /// None when the target lies outside the bounds, the rate is zero and the
    /// value differs, or the value moves away from the target (which includes
    /// sitting saturated at a bound).
    pub fn when(&self, target: f64) -> Option<Time> {
        if target < self.min || target > self.max {
            return None;
        }
        if self.value == target {
            return Some(self.t0);
        }
        if self.rate == 0.0 {
            return None;
        }

        let t = (target - self.value) / self.rate + self.t0;
        if t >= self.t0 {
            Some(t)
        } else {
            None
        }
    }
}

/// The two value models a variable can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableKind {
    /// Holds its value until set; time is ignored
    Discrete { value: f64 },
    Linear(Linear),
}

/// A named value inside a snapshot's registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default)]
    tags: TagSet,
    #[serde(flatten)]
    kind: VariableKind,
}

impl Variable {
    pub fn discrete(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            tags: TagSet::new(),
            kind: VariableKind::Discrete { value },
        }
    }

    pub fn linear(
        name: impl Into<String>,
        value: f64,
        rate: f64,
        min: f64,
        max: f64,
    ) -> Result<Self> {
        let name = name.into();
        let linear = Linear::new(value, rate, min, max).ok_or_else(|| {
            EngineError::InvalidBounds {
                name: name.clone(),
                min,
                max,
            }
        })?;
        Ok(Self {
            name,
            display_name: None,
            tags: TagSet::new(),
            kind: VariableKind::Linear(linear),
        })
    }

    /// Place the linear reference point at `t0` (used when creating variables mid-timeline)
    pub fn starting_at(mut self, t0: Time) -> Self {
        if let VariableKind::Linear(linear) = &mut self.kind {
            linear.t0 = t0;
        }
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
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

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to the internal name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    pub fn as_linear(&self) -> Option<&Linear> {
        match &self.kind {
            VariableKind::Linear(linear) => Some(linear),
            VariableKind::Discrete { .. } => None,
        }
    }

    pub fn is_linear(&self) -> bool {
        self.as_linear().is_some()
    }

    pub fn get(&self, t: Time) -> f64 {
        match &self.kind {
            VariableKind::Discrete { value } => *value,
            VariableKind::Linear(linear) => linear.get(t),
        }
    }

    pub fn set(&mut self, x: f64, t: Time) {
        match &mut self.kind {
            VariableKind::Discrete { value } => *value = x,
            VariableKind::Linear(linear) => linear.set(x, t),
        }
    }

    /// Rehome a linear variable; discrete variables are unaffected
    pub fn rehome(&mut self, t: Time) {
        if let VariableKind::Linear(linear) = &mut self.kind {
            linear.rehome(t);
        }
    }

    /// Current rate (zero for discrete variables)
    pub fn rate(&self) -> f64 {
        self.as_linear().map(Linear::rate).unwrap_or(0.0)
    }

    pub fn set_rate(&mut self, rate: f64, t: Time) -> Result<()> {
        self.linear_mut()?.set_rate(rate, t);
        Ok(())
    }

    pub fn adjust_rate(&mut self, delta: f64, t: Time) -> Result<()> {
        self.linear_mut()?.adjust_rate(delta, t);
        Ok(())
    }

    /// Earliest time the variable reaches `target`
    pub fn when(&self, target: f64) -> Result<Time> {
        let linear = self
            .as_linear()
            .ok_or_else(|| EngineError::NotLinear(self.name.clone()))?;
        linear.when(target).ok_or_else(|| EngineError::Unreachable {
            name: self.name.clone(),
            target,
        })
    }

    fn linear_mut(&mut self) -> Result<&mut Linear> {
        match &mut self.kind {
            VariableKind::Linear(linear) => Ok(linear),
            VariableKind::Discrete { .. } => Err(EngineError::NotLinear(self.name.clone())),
        }
    }
}
