use std::{fmt::Debug, path::PathBuf};

use linked_hash_map::LinkedHashMap;

use crate::command::CommandTemplate;

pub mod yaml;

pub use yaml::YamlConfigSource;

pub const DEFAULT_CONFIG_FILE: &str = "conf.yml";
pub const DEFAULT_BRANCH: &str = "master";

/// Task identifiers mapped to their commands, in configuration order.
pub type TaskSpec = LinkedHashMap<String, CommandTemplate>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote URL every mirror must track
    pub repository: String,

    /// Branch whose history is walked
    pub branch: String,

    pub tasks: TaskSpec,
}

pub trait ConfigSource: Debug {
    fn load(&self) -> Result<Config, ConfigError>;
}

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file \"{}\" missing", .0.display())]
    Missing(PathBuf),
    #[error("Failed to read configuration file \"{}\": {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Invalid YAML in \"{}\": {}", .0.display(), .1)]
    Syntax(PathBuf, #[source] yaml_rust::ScanError),
    #[error("Configuration file \"{}\" is empty", .0.display())]
    Empty(PathBuf),
    #[error("Missing `{0}` key")]
    MissingKey(&'static str),
    #[error("Invalid `{0}`: {1}")]
    InvalidValue(&'static str, String),
    #[error("Invalid command for task `{0}`: {1}")]
    InvalidCommand(String, #[source] handlebars::RenderError),
}
