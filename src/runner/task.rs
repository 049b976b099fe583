//! Runtime task and project representation
//!
//! The config types describe what a project file says; the types here are
//! what the sequencer executes. Templates stay unrendered until a task runs.

use crate::config::{self, SettingValue};
use crate::error::{InterpolationResult, Result};
use crate::runner::{Maker, Resolver};
use crate::template::Value;
use std::fmt;

/// Fields every task carries, whatever its kind
#[derive(Debug, Clone, Default)]
pub struct TaskMeta {
    /// Name template
    pub name: String,

    /// Description template overriding the kind's default
    pub description: Option<String>,

    /// Commands run before the action
    pub before: Vec<Vec<String>>,

    /// Commands run after the action
    pub after: Vec<Vec<String>>,
}

impl TaskMeta {
    /// Metadata with just a name
    pub fn named(name: impl Into<String>) -> Self {
        TaskMeta {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A unit of deployment work
///
/// The sequencer drives every task through the same steps: render its
/// description, ask [`Task::is_up_to_date`], render every field named by
/// [`Task::field_names`], and only then call [`Task::run`]. Implementations
/// read their fields through the resolver (`cx.field_str("path")`) so that
/// `task.*` references and error context behave the same everywhere.
pub trait Task: fmt::Debug {
    fn meta(&self) -> &TaskMeta;

    /// Kind name as written in project files
    fn kind(&self) -> &'static str;

    /// Description template used when the project file does not give one
    fn default_description(&self) -> &'static str;

    /// Fields exposed as `task.<name>`, rendered before the action runs
    fn field_names(&self) -> &'static [&'static str];

    /// Resolve `task.<name>`; `Ok(None)` when the task has no such attribute
    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>>;

    /// Composite tasks select and run nested tasks rather than causing effects
    /// themselves, so they also run in simulate mode.
    fn is_composite(&self) -> bool {
        false
    }

    /// Whether the desired end state already holds
    fn is_up_to_date(&self, _cx: &Resolver<'_>, _maker: &mut Maker) -> Result<bool> {
        Ok(false)
    }

    /// Perform the task's effects
    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()>;
}

/// A setting declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub default: SettingValue,
    pub help: Option<String>,
}

impl Setting {
    pub fn from_config(def: config::SettingDef) -> Self {
        Setting {
            name: def.name,
            default: def.default,
            help: def.help,
        }
    }
}

/// A project ready to run
#[derive(Debug)]
pub struct Project {
    pub name: String,
    pub title: Option<String>,
    pub requires: Vec<String>,
    pub settings: Vec<Setting>,
    pub tasks: Vec<Box<dyn Task>>,
}

impl Project {
    /// Build the runtime project from its definition
    pub fn from_config(def: config::ProjectDef) -> Self {
        Project {
            name: def.name,
            title: def.title,
            requires: def.requires,
            settings: def.settings.into_iter().map(Setting::from_config).collect(),
            tasks: def
                .tasks
                .into_iter()
                .map(crate::runner::tasks::build)
                .collect(),
        }
    }

    /// An empty project, for building one up in code
    pub fn new(name: impl Into<String>) -> Self {
        Project {
            name: name.into(),
            title: None,
            requires: Vec::new(),
            settings: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Add a setting
    pub fn with_setting(mut self, name: &str, default: SettingValue) -> Self {
        self.settings.push(Setting {
            name: name.to_string(),
            default,
            help: None,
        });
        self
    }

    /// Add a task
    pub fn with_task(mut self, task: Box<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings.iter().find(|s| s.name == name)
    }

    /// Title, falling back to the name
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Look up `project.<name>`
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value = match name {
            "name" => Value::Str(self.name.clone()),
            "title" => Value::Str(self.display_title().to_string()),
            "requires" => Value::from(self.requires.clone()),
            "settings" => Value::List(
                self.settings
                    .iter()
                    .map(|s| Value::Str(s.name.clone()))
                    .collect(),
            ),
            "tasks" => Value::List(
                self.tasks
                    .iter()
                    .map(|t| Value::Str(t.meta().name.clone()))
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_from_config() {
        let def: config::ProjectDef = serde_yaml::from_str(
            r#"
name: app
requires: [base]
settings:
  - name: port
    default: "8080"
    help: Port to serve on
tasks:
  - name: layout
    ensure-dir: { path: var }
"#,
        )
        .unwrap();

        let project = Project::from_config(def);
        assert_eq!(project.display_title(), "app");
        assert_eq!(project.tasks.len(), 1);
        assert_eq!(project.tasks[0].kind(), "ensure-dir");
        assert_eq!(
            project.setting("port").and_then(|s| s.help.as_deref()),
            Some("Port to serve on")
        );
        assert_eq!(
            project.attribute("settings"),
            Some(Value::List(vec![Value::from("port")]))
        );
        assert_eq!(
            project.attribute("requires"),
            Some(Value::List(vec![Value::from("base")]))
        );
    }
}
