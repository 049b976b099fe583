//! Project file validation
//!
//! Structural checks only. Templates are not parsed here: a malformed
//! template fails when its task runs, after earlier tasks have completed.
//! `lint_templates` parses them up front for the `check` command.

use crate::config::parse::Projects;
use crate::config::types::{ProjectDef, SettingValue, TaskDef, TaskKind};
use crate::error::{ConfigError, ConfigResult, InterpolationError};
use crate::template::{parse_expression, Template};
use std::collections::HashSet;

/// Validate a complete set of projects
pub fn validate_projects(projects: &Projects) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for project in &projects.projects {
        if !seen.insert(project.name.as_str()) {
            return Err(ConfigError::DuplicateProject(project.name.clone()));
        }
        validate_project(project)?;
    }

    for project in &projects.projects {
        for required in &project.requires {
            if projects.get(required).is_none() {
                return Err(ConfigError::UnknownRequirement {
                    project: project.name.clone(),
                    required: required.clone(),
                });
            }
        }
    }

    detect_circular_requirements(projects)?;

    Ok(())
}

/// Validate a single project
pub fn validate_project(project: &ProjectDef) -> ConfigResult<()> {
    if project.name.trim().is_empty() {
        return Err(ConfigError::Invalid("project name must not be empty".to_string()));
    }

    let mut names = HashSet::new();
    for setting in &project.settings {
        if !is_identifier(&setting.name) {
            return Err(ConfigError::Invalid(format!(
                "setting name '{}' in project '{}' is not a valid identifier",
                setting.name, project.name
            )));
        }
        if !names.insert(setting.name.as_str()) {
            return Err(ConfigError::DuplicateSetting {
                project: project.name.clone(),
                setting: setting.name.clone(),
            });
        }
    }

    for task in &project.tasks {
        validate_task(&project.name, task)?;
    }

    Ok(())
}

fn validate_task(project: &str, task: &TaskDef) -> ConfigResult<()> {
    let invalid = |message: String| {
        ConfigError::Invalid(format!(
            "task '{}' in project '{}': {}",
            task.name, project, message
        ))
    };

    for hook in task.before.iter().chain(task.after.iter()) {
        if hook.is_empty() {
            return Err(invalid("hook commands must not be empty".to_string()));
        }
    }

    match &task.kind {
        TaskKind::Script(def) if def.command.is_empty() => {
            Err(invalid("script command must not be empty".to_string()))
        }
        TaskKind::RequireVersion(def) if def.command.is_empty() => {
            Err(invalid("require-version command must not be empty".to_string()))
        }
        TaskKind::RequireVersion(def) if def.minimum.is_none() && def.maximum.is_none() => {
            Err(invalid("require-version needs a minimum or a maximum".to_string()))
        }
        TaskKind::WaitFor(def) if def.command.is_empty() => {
            Err(invalid("wait-for command must not be empty".to_string()))
        }
        TaskKind::WaitFor(def) if def.interval_ms == 0 => {
            Err(invalid("wait-for interval_ms must be positive".to_string()))
        }
        TaskKind::Conditional(def) => {
            if def.when.is_empty() && def.default.is_none() {
                return Err(invalid("conditional needs at least one branch".to_string()));
            }
            for branch in &def.when {
                validate_task(project, &branch.task)?;
            }
            if let Some(default) = &def.default {
                validate_task(project, default)?;
            }
            Ok(())
        }
        TaskKind::ForEach(def) => {
            if !is_identifier(&def.var) {
                return Err(invalid(format!(
                    "loop variable '{}' is not a valid identifier",
                    def.var
                )));
            }
            if matches!(def.var.as_str(), "env" | "config" | "project" | "task") {
                return Err(invalid(format!(
                    "loop variable '{}' would hide a namespace",
                    def.var
                )));
            }
            validate_task(project, &def.task)
        }
        _ => Ok(()),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Detect cycles in project `requires` relationships
fn detect_circular_requirements(projects: &Projects) -> ConfigResult<()> {
    let mut visited = HashSet::new();
    for project in &projects.projects {
        let mut stack = Vec::new();
        check_requirement_cycle(projects, &project.name, &mut visited, &mut stack)?;
    }
    Ok(())
}

fn check_requirement_cycle(
    projects: &Projects,
    name: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> ConfigResult<()> {
    if stack.iter().any(|s| s == name) {
        stack.push(name.to_string());
        return Err(ConfigError::CircularRequirement(stack.join(" -> ")));
    }

    if visited.contains(name) {
        return Ok(());
    }

    let project = projects
        .get(name)
        .ok_or_else(|| ConfigError::ProjectNotFound(name.to_string()))?;

    stack.push(name.to_string());
    for required in &project.requires {
        check_requirement_cycle(projects, required, visited, stack)?;
    }
    stack.pop();
    visited.insert(name.to_string());

    Ok(())
}

/// Order requested projects so that each comes after the requested projects it requires.
///
/// Requirements that were not requested are not added.
pub fn order_requested<'a>(projects: &'a Projects, requested: &[String]) -> ConfigResult<Vec<&'a ProjectDef>> {
    let mut ordered: Vec<&ProjectDef> = Vec::new();

    fn visit<'a>(
        projects: &'a Projects,
        name: &str,
        requested: &[String],
        ordered: &mut Vec<&'a ProjectDef>,
    ) -> ConfigResult<()> {
        if ordered.iter().any(|p| p.name == name) {
            return Ok(());
        }
        let project = projects
            .get(name)
            .ok_or_else(|| ConfigError::ProjectNotFound(name.to_string()))?;
        for required in &project.requires {
            if requested.iter().any(|r| r == required) {
                visit(projects, required, requested, ordered)?;
            }
        }
        ordered.push(project);
        Ok(())
    }

    for name in requested {
        visit(projects, name, requested, &mut ordered)?;
    }
    Ok(ordered)
}

/// A template that failed to parse
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateProblem {
    /// `project / task / field` path of the template
    pub location: String,
    pub error: InterpolationError,
}

/// Parse every template in every project and report syntax errors
pub fn lint_templates(projects: &Projects) -> Vec<TemplateProblem> {
    let mut problems = Vec::new();

    for project in &projects.projects {
        for setting in &project.settings {
            let location = format!("{} / setting {}", project.name, setting.name);
            match &setting.default {
                SettingValue::Single(t) => check_template(&location, t, &mut problems),
                SettingValue::List(items) => {
                    for t in items {
                        check_template(&location, t, &mut problems);
                    }
                }
            }
        }
        for task in &project.tasks {
            lint_task(&project.name, task, &mut problems);
        }
    }

    problems
}

fn lint_task(prefix: &str, task: &TaskDef, problems: &mut Vec<TemplateProblem>) {
    let location = format!("{} / {}", prefix, task.name);
    check_template(&location, &task.name, problems);
    if let Some(description) = &task.description {
        check_template(&format!("{} / description", location), description, problems);
    }
    for hook in task.before.iter().chain(task.after.iter()) {
        for arg in hook {
            check_template(&format!("{} / hook", location), arg, problems);
        }
    }

    let at = |name: &str| format!("{} / {}", location, name);

    match &task.kind {
        TaskKind::EnsureDir(def) => check_template(&at("path"), &def.path, problems),
        TaskKind::EnsureFile(def) => {
            check_template(&at("path"), &def.path, problems);
            check_template(&at("content"), &def.content, problems);
        }
        TaskKind::CopyDir(def) => {
            check_template(&at("source"), &def.source, problems);
            check_template(&at("dest"), &def.dest, problems);
            for pattern in &def.exclude {
                check_template(&at("exclude"), pattern, problems);
            }
        }
        TaskKind::Symlink(def) => {
            check_template(&at("source_glob"), &def.source_glob, problems);
            check_template(&at("dest_dir"), &def.dest_dir, problems);
            if let Some(exclude) = &def.exclude_glob {
                check_template(&at("exclude_glob"), exclude, problems);
            }
        }
        TaskKind::Script(def) => {
            for arg in &def.command {
                check_template(&at("command"), arg, problems);
            }
            if let Some(cwd) = &def.cwd {
                check_template(&at("cwd"), cwd, problems);
            }
            for value in def.env.values() {
                check_template(&at("env"), value, problems);
            }
        }
        TaskKind::Checkout(def) => {
            check_template(&at("repository"), &def.repository, problems);
            check_template(&at("dest"), &def.dest, problems);
            if let Some(base) = &def.base_repository {
                check_template(&at("base_repository"), base, problems);
            }
        }
        TaskKind::InstallTarball(def) => {
            check_template(&at("url"), &def.url, problems);
            check_template(&at("dest"), &def.dest, problems);
            check_template(&at("version"), &def.version, problems);
            if let Some(version_file) = &def.version_file {
                check_template(&at("version_file"), version_file, problems);
            }
        }
        TaskKind::RequireVersion(def) => {
            for arg in &def.command {
                check_template(&at("command"), arg, problems);
            }
            if let Some(minimum) = &def.minimum {
                check_template(&at("minimum"), minimum, problems);
            }
            if let Some(maximum) = &def.maximum {
                check_template(&at("maximum"), maximum, problems);
            }
        }
        TaskKind::WaitFor(def) => {
            for arg in &def.command {
                check_template(&at("command"), arg, problems);
            }
            if let Some(expect) = &def.expect {
                check_template(&at("expect"), expect, problems);
            }
        }
        TaskKind::Confirm(def) => check_template(&at("question"), &def.question, problems),
        TaskKind::Conditional(def) => {
            for branch in &def.when {
                check_template(&at("condition"), &branch.condition, problems);
                lint_task(&location, &branch.task, problems);
            }
            if let Some(default) = &def.default {
                lint_task(&location, default, problems);
            }
        }
        TaskKind::ForEach(def) => {
            if let Err(error) = parse_expression(&def.over) {
                problems.push(TemplateProblem {
                    location: format!("{} / over", location),
                    error,
                });
            }
            lint_task(&location, &def.task, problems);
        }
    }
}

fn check_template(location: &str, template: &str, problems: &mut Vec<TemplateProblem>) {
    if let Err(error) = Template::parse(template) {
        problems.push(TemplateProblem {
            location: location.to_string(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_projects;

    fn load(yaml: &str) -> Projects {
        parse_projects(yaml, None).unwrap()
    }

    #[test]
    fn test_validate_valid_projects() {
        let projects = load(
            r#"
projects:
  - name: base
  - name: app
    requires: [base]
    settings:
      - name: port
        default: "8080"
    tasks:
      - name: layout
        ensure-dir: { path: var }
"#,
        );
        assert!(validate_projects(&projects).is_ok());
    }

    #[test]
    fn test_duplicate_project() {
        let projects = load("projects:\n  - name: a\n  - name: a\n");
        assert!(matches!(
            validate_projects(&projects),
            Err(ConfigError::DuplicateProject(name)) if name == "a"
        ));
    }

    #[test]
    fn test_duplicate_setting() {
        let projects = load(
            r#"
projects:
  - name: app
    settings:
      - name: port
      - name: port
"#,
        );
        assert!(matches!(
            validate_projects(&projects),
            Err(ConfigError::DuplicateSetting { .. })
        ));
    }

    #[test]
    fn test_unknown_requirement() {
        let projects = load("projects:\n  - name: app\n    requires: [ghost]\n");
        assert!(matches!(
            validate_projects(&projects),
            Err(ConfigError::UnknownRequirement { .. })
        ));
    }

    #[test]
    fn test_circular_requirement() {
        let projects = load(
            r#"
projects:
  - name: a
    requires: [b]
  - name: b
    requires: [a]
"#,
        );
        assert!(matches!(
            validate_projects(&projects),
            Err(ConfigError::CircularRequirement(_))
        ));
    }

    #[test]
    fn test_loop_variable_cannot_hide_namespace() {
        let projects = load(
            r#"
projects:
  - name: app
    tasks:
      - name: loop
        for-each:
          over: "[1, 2]"
          as: config
          task:
            name: inner
            ensure-dir: { path: x }
"#,
        );
        assert!(matches!(
            validate_projects(&projects),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_order_requested() {
        let projects = load(
            r#"
projects:
  - name: app
    requires: [base, extra]
  - name: base
  - name: extra
"#,
        );
        let ordered = order_requested(&projects, &["app".to_string(), "base".to_string()]).unwrap();
        let names: Vec<&str> = ordered.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["base", "app"]);
    }

    #[test]
    fn test_lint_templates_reports_locations() {
        let projects = load(
            r#"
projects:
  - name: app
    settings:
      - name: port
        default: "{{ 1 + }}"
    tasks:
      - name: pick
        conditional:
          when:
            - condition: "{{if x}}"
              task:
                name: inner
                ensure-dir: { path: "{{ok}}" }
"#,
        );
        let problems = lint_templates(&projects);
        let locations: Vec<&str> = problems.iter().map(|p| p.location.as_str()).collect();
        assert_eq!(locations, vec!["app / setting port", "app / pick / condition"]);
    }
}
