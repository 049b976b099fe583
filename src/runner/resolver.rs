//! Template resolution against the `env`, `config`, `project` and `task` namespaces
//!
//! A resolver is built for each task execution. Nothing is cached: a
//! `config.*` reference re-renders the winning setting value on every
//! access, so a setting may depend on state produced by an earlier task.

use crate::config::SettingValue;
use crate::error::{InterpolationError, InterpolationResult};
use crate::runner::{Environment, Project, Task};
use crate::template::{self, Binding, Scope, Template, Value};
use std::cell::RefCell;
use std::path::PathBuf;

const NAMESPACES: &[&str] = &["env", "config", "project", "task"];

/// Resolves templates for one task execution
pub struct Resolver<'a> {
    env: &'a Environment,
    project: &'a Project,
    task: Option<&'a dyn Task>,
    locals: Vec<(String, Value)>,
    active: RefCell<Vec<String>>,
}

/// Removes a name from the active stack when dropped
struct ActiveGuard<'r> {
    active: &'r RefCell<Vec<String>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.borrow_mut().pop();
    }
}

impl<'a> Resolver<'a> {
    /// Resolver for project-level templates (no current task)
    pub fn new(env: &'a Environment, project: &'a Project) -> Self {
        Resolver {
            env,
            project,
            task: None,
            locals: Vec::new(),
            active: RefCell::new(Vec::new()),
        }
    }

    /// Resolver with `task` as the current task; loop variables carry over
    pub fn for_task<'b>(&self, task: &'b dyn Task) -> Resolver<'b>
    where
        'a: 'b,
    {
        Resolver {
            env: self.env,
            project: self.project,
            task: Some(task),
            locals: self.locals.clone(),
            active: RefCell::new(Vec::new()),
        }
    }

    /// Resolver with an extra loop variable bound
    pub fn with_local(&self, name: &str, value: Value) -> Resolver<'a> {
        let mut locals = self.locals.clone();
        locals.retain(|(n, _)| n != name);
        locals.push((name.to_string(), value));
        Resolver {
            env: self.env,
            project: self.project,
            task: self.task,
            locals,
            active: RefCell::new(Vec::new()),
        }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    pub fn project(&self) -> &'a Project {
        self.project
    }

    pub fn task(&self) -> Option<&'a dyn Task> {
        self.task
    }

    /// Render a template, attributing any error to `field`
    pub fn render(&self, field: &str, source: &str) -> InterpolationResult<String> {
        Template::parse(source)
            .and_then(|t| t.render(self))
            .map_err(|e| e.in_field(field, source))
    }

    /// Render a template into a string value
    pub fn render_value(&self, field: &str, source: &str) -> InterpolationResult<Value> {
        self.render(field, source).map(Value::Str)
    }

    /// Render a list of templates into a list value
    pub fn render_list_value(&self, field: &str, sources: &[String]) -> InterpolationResult<Value> {
        sources
            .iter()
            .map(|s| self.render_value(field, s))
            .collect::<InterpolationResult<Vec<_>>>()
            .map(Value::List)
    }

    /// Render a template and read it as a boolean
    pub fn condition(&self, field: &str, source: &str) -> InterpolationResult<bool> {
        self.render(field, source).map(|s| template::str_is_truthy(&s))
    }

    /// Evaluate a bare expression (no `{{ }}`)
    pub fn evaluate(&self, field: &str, expression: &str) -> InterpolationResult<Value> {
        template::parse_expression(expression)
            .and_then(|expr| template::evaluate(&expr, self))
            .map_err(|e| e.in_field(field, expression))
    }

    /// `task.<name>` of the current task
    pub fn field(&self, name: &str) -> InterpolationResult<Value> {
        match self.member("task", name)? {
            Binding::Value(value) => Ok(value),
            Binding::Namespace(ns) => Err(InterpolationError::Evaluation(format!(
                "namespace '{}' cannot be used as a value",
                ns
            ))),
        }
    }

    /// `task.<name>` as a string
    pub fn field_str(&self, name: &str) -> InterpolationResult<String> {
        self.field(name).map(|v| v.to_string())
    }

    /// `task.<name>` as a string, or `None` when unset or empty
    pub fn field_opt(&self, name: &str) -> InterpolationResult<Option<String>> {
        Ok(match self.field(name)? {
            Value::None => None,
            value => Some(value.to_string()).filter(|s| !s.is_empty()),
        })
    }

    /// `task.<name>` as a path resolved against `env.base_path`
    pub fn field_path(&self, name: &str) -> InterpolationResult<PathBuf> {
        self.field_str(name).map(|p| self.env.resolve_path(&p))
    }

    /// `task.<name>` as a list of strings
    pub fn field_list(&self, name: &str) -> InterpolationResult<Vec<String>> {
        Ok(self
            .field(name)?
            .into_items()
            .iter()
            .map(Value::to_string)
            .collect())
    }

    /// `task.<name>` read as a boolean
    pub fn field_flag(&self, name: &str) -> InterpolationResult<bool> {
        self.field(name).map(|v| v.is_truthy())
    }

    /// Resolve `config.<name>` for the current project
    pub fn setting(&self, name: &str) -> InterpolationResult<Value> {
        let key = format!("config.{}", name);
        let _guard = self.enter(&key)?;

        if let Some(inherited) = self.env.config.setting(&self.project.name, name) {
            return self.render_value(&key, inherited);
        }

        let setting = self
            .project
            .setting(name)
            .ok_or_else(|| InterpolationError::UndefinedName(key.clone()))?;
        match &setting.default {
            SettingValue::Single(source) => self.render_value(&key, source),
            SettingValue::List(sources) => self.render_list_value(&key, sources),
        }
    }

    fn enter(&self, key: &str) -> InterpolationResult<ActiveGuard<'_>> {
        let mut active = self.active.borrow_mut();
        if active.iter().any(|k| k == key) {
            return Err(InterpolationError::Recursive(key.to_string()));
        }
        active.push(key.to_string());
        Ok(ActiveGuard {
            active: &self.active,
        })
    }
}

impl Scope for Resolver<'_> {
    fn root(&self, name: &str) -> InterpolationResult<Binding> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(Binding::Value(value.clone()));
        }
        if NAMESPACES.contains(&name) {
            return Ok(Binding::Namespace(name.to_string()));
        }
        Err(InterpolationError::UndefinedName(name.to_string()))
    }

    fn member(&self, namespace: &str, name: &str) -> InterpolationResult<Binding> {
        let undefined = || InterpolationError::UndefinedName(format!("{}.{}", namespace, name));

        let value = match namespace {
            "env" => self.env.attribute(name).ok_or_else(undefined)?,
            "config" => self.setting(name)?,
            "project" => self.project.attribute(name).ok_or_else(undefined)?,
            "task" => {
                let task = self.task.ok_or_else(undefined)?;
                let key = format!("task.{}", name);
                let _guard = self.enter(&key)?;
                match name {
                    "name" => self.render_value(&key, &task.meta().name)?,
                    "kind" => Value::from(task.kind()),
                    _ => task.attribute(name, self)?.ok_or_else(undefined)?,
                }
            }
            _ => return Err(undefined()),
        };

        Ok(Binding::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalConfig;
    use crate::error::Result;
    use crate::runner::{Maker, TaskMeta};

    #[derive(Debug)]
    struct FieldTask {
        meta: TaskMeta,
        dest: String,
        marker: String,
    }

    impl Task for FieldTask {
        fn meta(&self) -> &TaskMeta {
            &self.meta
        }
        fn kind(&self) -> &'static str {
            "field-task"
        }
        fn default_description(&self) -> &'static str {
            "Install into {{task.dest}}"
        }
        fn field_names(&self) -> &'static [&'static str] {
            &["dest", "marker"]
        }
        fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
            match name {
                "dest" => cx.render_value(name, &self.dest).map(Some),
                "marker" => cx.render_value(name, &self.marker).map(Some),
                _ => Ok(None),
            }
        }
        fn run(&self, _cx: &Resolver<'_>, _maker: &mut Maker) -> Result<()> {
            Ok(())
        }
    }

    fn project() -> Project {
        Project::new("app")
            .with_setting(
                "port",
                SettingValue::Single(
                    "{{int(env.config.general.base_port) + int(config.port_offset)}}".to_string(),
                ),
            )
            .with_setting("port_offset", SettingValue::Single("1".to_string()))
            .with_setting(
                "products",
                SettingValue::List(vec!["a".to_string(), "{{project.name}}-b".to_string()]),
            )
            .with_setting("loop_a", SettingValue::Single("{{config.loop_b}}".to_string()))
            .with_setting("loop_b", SettingValue::Single("{{config.loop_a}}".to_string()))
    }

    fn environment() -> Environment {
        let config = ExternalConfig::parse("general:\n  base_port: 8000\n").unwrap();
        Environment::new(PathBuf::from("/srv")).with_config(config)
    }

    #[test]
    fn test_setting_references_other_settings() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        assert_eq!(cx.render("t", "{{config.port}}").unwrap(), "8001");
    }

    #[test]
    fn test_list_setting() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        assert_eq!(
            cx.evaluate("over", "config.products").unwrap(),
            Value::List(vec![Value::from("a"), Value::from("app-b")])
        );
    }

    #[test]
    fn test_inherited_value_wins_over_default() {
        let mut config = ExternalConfig::parse("general:\n  base_port: 8000\napp:\n  port_offset: 5\n").unwrap();
        config.apply_override("app.host=example.org").unwrap();
        let env = Environment::new(PathBuf::from("/srv")).with_config(config);
        let project = project().with_setting("host", SettingValue::Single("localhost".to_string()));
        let cx = Resolver::new(&env, &project);

        assert_eq!(cx.render("t", "{{config.host}}:{{config.port}}").unwrap(), "example.org:8005");
    }

    #[test]
    fn test_recursive_settings_are_detected() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        let err = cx.render("t", "{{config.loop_a}}").unwrap_err();
        assert_eq!(
            err.kind(),
            &InterpolationError::Recursive("config.loop_a".to_string())
        );
    }

    #[test]
    fn test_undefined_setting_names_the_field() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        let err = cx.render("dest", "{{config.nope}}").unwrap_err();
        match err {
            InterpolationError::InField { field, template, source } => {
                assert_eq!(field, "dest");
                assert_eq!(template, "{{config.nope}}");
                assert_eq!(*source, InterpolationError::UndefinedName("config.nope".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_task_fields_reference_each_other() {
        let env = environment();
        let project = project();
        let task = FieldTask {
            meta: TaskMeta::named("Install {{project.name}}"),
            dest: "{{env.base_path}}/{{project.name}}/src".to_string(),
            marker: "{{task.dest}}/version.txt".to_string(),
        };
        let base = Resolver::new(&env, &project);
        let cx = base.for_task(&task);

        assert_eq!(cx.field_str("marker").unwrap(), "/srv/app/src/version.txt");
        assert_eq!(cx.field_str("name").unwrap(), "Install app");
        assert_eq!(cx.field_str("kind").unwrap(), "field-task");
        assert!(cx.field("missing").is_err());
    }

    #[test]
    fn test_self_referencing_field() {
        let env = environment();
        let project = project();
        let task = FieldTask {
            meta: TaskMeta::named("loop"),
            dest: "{{task.marker}}".to_string(),
            marker: "{{task.dest}}".to_string(),
        };
        let base = Resolver::new(&env, &project);
        let cx = base.for_task(&task);
        let err = cx.field("dest").unwrap_err();
        assert_eq!(err.kind(), &InterpolationError::Recursive("task.dest".to_string()));
    }

    #[test]
    fn test_task_namespace_without_task() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        assert!(cx.render("t", "{{task.name}}").is_err());
    }

    #[test]
    fn test_locals_shadow_in_order() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project)
            .with_local("item", Value::from("x"))
            .with_local("item", Value::from("y"));
        assert_eq!(cx.render("t", "{{item}}").unwrap(), "y");
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let env = environment();
        let project = project();
        let cx = Resolver::new(&env, &project);
        let template = "{{if config.port_offset}}port {{config.port}}{{endif}} on {{env.base_path}}";
        assert_eq!(cx.render("t", template).unwrap(), cx.render("t", template).unwrap());
    }
}
