//! Load game content from TOML
//!
//! A content file declares the starting variables, the activities (plain
//! processes or tasks) a player can start, the upgrade catalog and an
//! optional opening plan of activities to start at given times.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::{TagSet, Time};
use crate::state::{TimeState, Variable};
use crate::timeline::{Change, Event, LifecycleHooks, Process, Task, TriggerContext};
use crate::upgrades::{UpgradeDefinition, UpgradeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum VariableKindDef {
    Discrete,
    Linear,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

#[derive(Debug, Clone, Deserialize)]
struct VariableDef {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    kind: VariableKindDef,
    #[serde(default)]
    value: f64,
    #[serde(default)]
    rate: f64,
    #[serde(default)]
    min: f64,
    #[serde(default = "unbounded")]
    max: f64,
    #[serde(default)]
    tags: TagSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActivityKind {
    #[default]
    Process,
    Task,
}

#[derive(Debug, Clone, Deserialize)]
struct FlowDef {
    variable: String,
    rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RewardDef {
    variable: String,
    amount: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
struct ActivityDef {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    kind: ActivityKind,
    #[serde(default)]
    consumes: Vec<FlowDef>,
    #[serde(default)]
    produces: Vec<FlowDef>,
    #[serde(default)]
    tags: TagSet,
    #[serde(default = "one")]
    throttle: f64,
    /// Task only
    #[serde(default = "one")]
    work: f64,
    /// Task only
    #[serde(default = "one")]
    rate: f64,
    /// Task only: granted on completion
    #[serde(default)]
    rewards: Vec<RewardDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlanDef {
    activity: String,
    at: Time,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentFile {
    #[serde(default)]
    start_time: Time,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    variables: Vec<VariableDef>,
    #[serde(default)]
    activities: Vec<ActivityDef>,
    #[serde(default)]
    upgrades: Vec<UpgradeDefinition>,
    #[serde(default)]
    plan: Vec<PlanDef>,
}

/// Finish hooks granting fixed amounts when a task completes
#[derive(Debug, Clone, Default)]
pub struct Rewards {
    changes: Vec<Change>,
}

impl Rewards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, variable: impl Into<String>, amount: f64) -> Self {
        self.changes.push(Change::Add {
            variable: variable.into(),
            amount,
        });
        self
    }
}

impl LifecycleHooks for Rewards {
    fn on_finish_vars(&self, state: &mut TimeState, _ctx: &TriggerContext<'_>) -> Result<()> {
        for change in &self.changes {
            change.apply(state)?;
        }
        Ok(())
    }
}

/// Everything a content file defines
#[derive(Debug, Clone)]
pub struct Content {
    pub config: EngineConfig,
    pub initial: TimeState,
    pub activities: Vec<Arc<dyn Event>>,
    pub upgrades: UpgradeRegistry,
    /// Activities to start, by name, with their start times
    pub plan: Vec<(String, Time)>,
}

impl Content {
    pub fn activity(&self, name: &str) -> Result<Arc<dyn Event>> {
        self.activities
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("activity {}", name)))
    }
}

fn build_variable(def: VariableDef, t0: Time) -> Result<Variable> {
    let var = match def.kind {
        VariableKindDef::Discrete => Variable::discrete(def.name, def.value),
        VariableKindDef::Linear => {
            Variable::linear(def.name, def.value, def.rate, def.min, def.max)?.starting_at(t0)
        }
    };
    let var = var.with_tags(def.tags);
    Ok(match def.display_name {
        Some(display_name) => var.with_display_name(display_name),
        None => var,
    })
}

/// Tasks name their progress variable with the content file's own suffix
fn build_activity(def: ActivityDef, config: &EngineConfig) -> Arc<dyn Event> {
    let progress_variable = format!("{}{}", def.name, config.progress_suffix);
    let mut process = Process::new(def.name)
        .with_tags(def.tags)
        .with_throttle(def.throttle);
    if let Some(display_name) = def.display_name {
        process = process.with_display_name(display_name);
    }
    for flow in def.consumes {
        process = process.consumes(flow.variable, flow.rate);
    }
    for flow in def.produces {
        process = process.produces(flow.variable, flow.rate);
    }

    match def.kind {
        ActivityKind::Process => Arc::new(process),
        ActivityKind::Task => {
            let rewards = def
                .rewards
                .into_iter()
                .fold(Rewards::new(), |r, reward| r.grant(reward.variable, reward.amount));
            Arc::new(
                Task::from_process(process.with_hooks(rewards))
                    .with_work(def.work)
                    .with_rate(def.rate)
                    .with_progress_variable(progress_variable),
            )
        }
    }
}

/// Parse content from a TOML string
pub fn load_content(content: &str) -> Result<Content> {
    let file: ContentFile = toml::from_str(content)?;
    file.engine.validate()?;

    let mut initial = TimeState::new(file.start_time);
    for def in file.variables {
        initial.add_variable(build_variable(def, file.start_time)?)?;
    }

    let mut activities: Vec<Arc<dyn Event>> = Vec::with_capacity(file.activities.len());
    for def in file.activities {
        if activities.iter().any(|a| a.name() == def.name) {
            return Err(EngineError::DuplicateName(def.name));
        }
        activities.push(build_activity(def, &file.engine));
    }

    let mut upgrades = UpgradeRegistry::new();
    for upgrade in file.upgrades {
        if upgrades.get(&upgrade.name).is_ok() {
            return Err(EngineError::DuplicateName(upgrade.name));
        }
        upgrades.register(upgrade);
    }

    let plan: Vec<(String, Time)> = file.plan.into_iter().map(|p| (p.activity, p.at)).collect();
    for (name, _) in &plan {
        if !activities.iter().any(|a| a.name() == name) {
            return Err(EngineError::NotFound(format!("activity {}", name)));
        }
    }

    info!(
        variables = initial.registry().len(),
        activities = activities.len(),
        upgrades = upgrades.len(),
        "Content loaded"
    );

    Ok(Content {
        config: file.engine,
        initial,
        activities,
        upgrades,
        plan,
    })
}

/// Read and parse a content file
pub fn load_content_file(path: &Path) -> Result<Content> {
    let text = fs::read_to_string(path)?;
    load_content(&text)
}
