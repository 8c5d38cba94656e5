// src/config/mod.rs

//! Configuration loading, modelling and validation.
//!
//! The split mirrors the rest of the crate's "raw in, validated out" policy:
//! [`model::RawConfigFile`] is a direct serde mapping of the TOML file, and
//! [`model::ConfigFile`] is the validated form the daemon actually consumes.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BudgetSection, ConfigFile, JobConfig, RawConfigFile, ResourceLimits, WatchSection,
};
