//! A single stacking bonus

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::types::TagSet;

/// Parameter a modifier scales
///
/// Serialized as a bare string: "rate", "consumed", "produced" or any other name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetParam {
    /// Task work rate
    Rate,
    /// Process consumption rates
    Consumed,
    /// Process production rates
    Produced,
    Other(String),
}

impl fmt::Display for TargetParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetParam::Rate => write!(f, "rate"),
            TargetParam::Consumed => write!(f, "consumed"),
            TargetParam::Produced => write!(f, "produced"),
            TargetParam::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for TargetParam {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TargetParam::from(s.to_string()))
    }
}

impl From<String> for TargetParam {
    fn from(s: String) -> Self {
        match s.as_str() {
            "rate" => TargetParam::Rate,
            "consumed" => TargetParam::Consumed,
            "produced" => TargetParam::Produced,
            _ => TargetParam::Other(s),
        }
    }
}

impl From<TargetParam> for String {
    fn from(param: TargetParam) -> Self {
        param.to_string()
    }
}

/// A bonus contributed by some source (an upgrade, an event)
///
/// Modifiers sharing a `modifier_type` add together; different types multiply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub source: String,
    pub modifier_type: String,
    /// Fractional bonus: 0.2 is +20%, -0.1 is -10%
    pub value: f64,
    pub target_param: TargetParam,
    /// Empty means "applies to everything with this param"
    #[serde(default)]
    pub target_tags: TagSet,
}

impl Modifier {
    pub fn new(
        source: impl Into<String>,
        modifier_type: impl Into<String>,
        value: f64,
        target_param: TargetParam,
    ) -> Self {
        Self {
            source: source.into(),
            modifier_type: modifier_type.into(),
            value,
            target_param,
            target_tags: TagSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether this modifier scales `param` for something tagged `tags`
    pub fn applies_to(&self, param: &TargetParam, tags: &TagSet) -> bool {
        if &self.target_param != param {
            return false;
        }
        self.target_tags.is_empty() || !self.target_tags.is_disjoint(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tag_set;

    #[test]
    fn test_untagged_modifier_applies_to_any_tags() {
        let m = Modifier::new("basic_tools", "tools", 0.2, TargetParam::Rate);
        assert!(m.applies_to(&TargetParam::Rate, &TagSet::new()));
        assert!(m.applies_to(&TargetParam::Rate, &tag_set(["wood"])));
        assert!(!m.applies_to(&TargetParam::Consumed, &TagSet::new()));
    }

    #[test]
    fn test_tagged_modifier_needs_intersection() {
        let m = Modifier::new("axe", "tools", 0.2, TargetParam::Rate).with_tags(["gathering"]);
        assert!(m.applies_to(&TargetParam::Rate, &tag_set(["gathering", "wood"])));
        assert!(!m.applies_to(&TargetParam::Rate, &tag_set(["crafting"])));
        assert!(!m.applies_to(&TargetParam::Rate, &TagSet::new()));
    }

    #[test]
    fn test_target_param_parse() {
        assert_eq!("rate".parse::<TargetParam>().unwrap(), TargetParam::Rate);
        assert_eq!(
            "capacity".parse::<TargetParam>().unwrap(),
            TargetParam::Other("capacity".into())
        );
        assert_eq!(TargetParam::Consumed.to_string(), "consumed");
    }

    #[test]
    fn test_modifier_json_uses_plain_param_names() {
        let m = Modifier::new("axe", "tools", 0.2, TargetParam::Produced);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"target_param\":\"produced\""));
        let back: Modifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
