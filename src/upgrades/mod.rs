//! Upgrades: definitions, purchase state and purchase events

pub mod definition;
pub mod purchase;
pub mod registry;

pub use definition::{
    Cost, Prerequisite, PrerequisiteKind, UpgradeDefinition, UpgradeEffect, UpgradeKind,
    Visibility,
};
pub use purchase::PurchaseEvent;
pub use registry::UpgradeRegistry;
