//! Upgrade definitions supplied by content

use serde::{Deserialize, Serialize};

use crate::core::types::TagSet;
use crate::modifiers::TargetParam;

/// Which tree an upgrade belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    /// Bought with resources; reset on prestige
    #[default]
    Regular,
    /// Tech tree; reset on prestige
    Research,
    /// Meta-progression; survives prestige
    Nexus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteKind {
    /// Another upgrade is purchased
    Upgrade,
    /// A research upgrade is purchased
    Research,
    /// A resource has been unlocked
    Resource,
    /// A variable is at least `value` in the snapshot checked against
    Variable,
    /// A task has been completed
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub kind: PrerequisiteKind,
    pub target: String,
    #[serde(default)]
    pub value: f64,
}

impl Prerequisite {
    pub fn upgrade(target: impl Into<String>) -> Self {
        Self {
            kind: PrerequisiteKind::Upgrade,
            target: target.into(),
            value: 0.0,
        }
    }

    pub fn research(target: impl Into<String>) -> Self {
        Self {
            kind: PrerequisiteKind::Research,
            target: target.into(),
            value: 0.0,
        }
    }

    pub fn variable(target: impl Into<String>, at_least: f64) -> Self {
        Self {
            kind: PrerequisiteKind::Variable,
            target: target.into(),
            value: at_least,
        }
    }

    pub fn task(target: impl Into<String>) -> Self {
        Self {
            kind: PrerequisiteKind::Task,
            target: target.into(),
            value: 0.0,
        }
    }

    pub fn resource(target: impl Into<String>) -> Self {
        Self {
            kind: PrerequisiteKind::Resource,
            target: target.into(),
            value: 0.0,
        }
    }

    /// Whether this prerequisite names another upgrade in the tree
    pub fn is_tree_edge(&self) -> bool {
        matches!(
            self.kind,
            PrerequisiteKind::Upgrade | PrerequisiteKind::Research
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub resource: String,
    pub amount: f64,
}

fn default_modifier_type() -> String {
    "default".to_string()
}

fn default_target_param() -> TargetParam {
    TargetParam::Rate
}

/// What purchasing an upgrade does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpgradeEffect {
    /// Add a modifier sourced from the upgrade
    Modifier {
        #[serde(default = "default_modifier_type")]
        modifier_type: String,
        value: f64,
        #[serde(default = "default_target_param")]
        target_param: TargetParam,
        #[serde(default)]
        target_tags: TagSet,
    },
    UnlockTask { task: String },
    UnlockResource { resource: String },
    /// Reveal an upgrade whose visibility is `Unlocked`
    UnlockUpgrade { upgrade: String },
    SetVariable { variable: String, value: f64 },
    AddVariable { variable: String, value: f64 },
    /// Multiplies the allowed timeline length
    MaxTimeMultiplier { multiplier: f64 },
    /// Raises the number of tasks that may run at once
    ParallelTasks { value: u32 },
}

/// When an unpurchased upgrade is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Always,
    /// Once every prerequisite is met
    #[default]
    Prerequisites,
    /// Once another purchase unlocks it
    Unlocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: UpgradeKind,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub costs: Vec<Cost>,
    #[serde(default)]
    pub effects: Vec<UpgradeEffect>,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub visibility: Visibility,
}

impl UpgradeDefinition {
    pub fn new(name: impl Into<String>, kind: UpgradeKind) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: String::new(),
            kind,
            prerequisites: Vec::new(),
            costs: Vec::new(),
            effects: Vec::new(),
            tags: TagSet::new(),
            visibility: Visibility::default(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires(mut self, prerequisite: Prerequisite) -> Self {
        self.prerequisites.push(prerequisite);
        self
    }

    pub fn costs(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.costs.push(Cost {
            resource: resource.into(),
            amount,
        });
        self
    }

    pub fn with_effect(mut self, effect: UpgradeEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}
