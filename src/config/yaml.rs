use std::path::{Path, PathBuf};

use yaml_rust::{Yaml, YamlLoader};

use crate::{
    command::CommandTemplate,
    config::{Config, ConfigError, ConfigSource, DEFAULT_BRANCH, TaskSpec},
};

/// Loads the configuration from a YAML file such as:
///
/// ```yaml
/// repository: https://github.com/user/project.git
/// branch: main
/// tasks:
///   lines: find src -name '*.rs' | xargs cat | wc -l
///   todos: grep -r TODO src | wc -l
///   image: docker inspect --format '\{{.Size}}' project:{{short_commit}}
/// ```
///
/// Commands may use `{{commit}}`, `{{short_commit}}`, `{{timestamp}}`,
/// `{{slot}}` and `{{task}}`. Any other `{{...}}` is rejected when loading;
/// prefix it with a backslash (`\{{`) to pass the braces to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlConfigSource(PathBuf);

impl YamlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl ConfigSource for YamlConfigSource {
    fn load(&self) -> Result<Config, ConfigError> {
        if !self.0.is_file() {
            return Err(ConfigError::Missing(self.0.clone()));
        }
        let text = std::fs::read_to_string(&self.0)
            .map_err(|e| ConfigError::Read(self.0.clone(), e))?;
        log::debug!("loading configuration from {}", self.0.display());
        parse_config(&self.0, &text)
    }
}

pub fn parse_config(path: &Path, text: &str) -> Result<Config, ConfigError> {
    let docs = YamlLoader::load_from_str(text)
        .map_err(|e| ConfigError::Syntax(path.to_path_buf(), e))?;
    let doc = docs
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::Empty(path.to_path_buf()))?;

    if doc.as_hash().is_none() {
        return Err(ConfigError::InvalidValue("document", "expected a mapping at the top level".into()));
    }

    let repository = match &doc["repository"] {
        Yaml::BadValue => return Err(ConfigError::MissingKey("repository")),
        Yaml::String(url) if !url.trim().is_empty() => url.trim().to_string(),
        other => return Err(ConfigError::InvalidValue("repository", format!("expected a non-empty string, got {other:?}"))),
    };

    let branch = match &doc["branch"] {
        Yaml::BadValue | Yaml::Null => DEFAULT_BRANCH.to_string(),
        Yaml::String(branch) => branch.clone(),
        other => return Err(ConfigError::InvalidValue("branch", format!("expected a string, got {other:?}"))),
    };

    let tasks = match &doc["tasks"] {
        Yaml::BadValue => return Err(ConfigError::MissingKey("tasks")),
        tasks => parse_tasks(tasks)?,
    };

    Ok(Config { repository, branch, tasks })
}

fn parse_tasks(tasks: &Yaml) -> Result<TaskSpec, ConfigError> {
    let tasks = tasks
        .as_hash()
        .ok_or_else(|| ConfigError::InvalidValue("tasks", "expected a mapping of task name to command".into()))?;

    let mut spec = TaskSpec::new();
    for (key, value) in tasks {
        let id = match key {
            Yaml::String(s) => s.clone(),
            Yaml::Integer(i) => i.to_string(),
            other => return Err(ConfigError::InvalidValue("tasks", format!("invalid task name {other:?}"))),
        };
        if id.chars().any(char::is_whitespace) {
            // machine-readable lines are space separated
            return Err(ConfigError::InvalidValue("tasks", format!("task name `{id}` contains whitespace")));
        }
        let source = value
            .as_str()
            .ok_or_else(|| ConfigError::InvalidValue("tasks", format!("command for `{id}` must be a string")))?;
        let command = CommandTemplate::parse(source)
            .map_err(|e| ConfigError::InvalidCommand(id.clone(), e))?;
        spec.insert(id, command);
    }

    if spec.is_empty() {
        return Err(ConfigError::InvalidValue("tasks", "at least one task is required".into()));
    }

    Ok(spec)
}
