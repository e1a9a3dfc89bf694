use handlebars::{Handlebars, RenderError};
use serde::Serialize;

/// A task command as written in the configuration file.
///
/// Commands are handlebars templates, rendered once per work unit with a
/// [`CommandContext`]. A command without any `{{...}}` renders to itself.
/// Literal braces, as in `docker inspect --format '\{{.Id}}'`, are written
/// with a leading backslash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTemplate {
    Shell(String),
}

/// Variables available to a command template.
#[derive(Debug, Clone, Serialize)]
pub struct CommandContext<'a> {
    pub task: &'a str,
    pub commit: &'a str,
    pub short_commit: &'a str,
    pub timestamp: i64,
    pub slot: usize,
}

impl CommandTemplate {
    /// Parses the template and renders it once against placeholder values,
    /// so that syntax errors and unknown variables surface at load time.
    pub fn parse(source: impl Into<String>) -> Result<Self, RenderError> {
        let source = source.into();
        let placeholder = CommandContext {
            task: "task",
            commit: "0000000000000000000000000000000000000000",
            short_commit: "0000000",
            timestamp: 0,
            slot: 0,
        };
        shell_handlebars().render_template(&source, &placeholder)?;
        Ok(Self::Shell(source))
    }

    pub fn source(&self) -> &str {
        let Self::Shell(cmd) = self;
        cmd
    }

    pub fn render(
        &self,
        handlebars: &Handlebars,
        context: &CommandContext,
    ) -> Result<String, RenderError> {
        let Self::Shell(cmd) = self;
        handlebars.render_template(cmd, context)
    }
}

/// Template engine configured for shell commands: no HTML escaping, and
/// unknown variables are errors instead of empty strings.
pub fn shell_handlebars() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);
    handlebars
}
