//! gittig core library: domain types, configuration, project registry, errors.
//!
//! - [`types`]: newtypes, lifecycle [`Phase`], config and descriptor structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: YAML load with `~/` expansion
//! - [`registry`]: config → ordered list of [`ProjectDescriptor`]

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use error::ConfigError;
pub use types::{Config, Phase, ProjectConfig, ProjectDescriptor, ProjectId};
