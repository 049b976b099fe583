//! Built-in task kinds
//!
//! Each kind keeps its fields as unrendered templates and renders them
//! through the [`Resolver`] when asked, so `task.<field>` works the same from
//! descriptions, other fields and the action itself.

mod checkout;
mod composite;
mod confirm;
mod fs;
mod script;
mod tarball;
mod version;
mod wait;

pub use checkout::Checkout;
pub use composite::{Conditional, ForEach};
pub use confirm::Confirm;
pub use fs::{CopyDir, EnsureDir, EnsureFile, Symlink};
pub use script::Script;
pub use tarball::InstallTarball;
pub use version::{compare_versions, extract_version, RequireVersion};
pub use wait::WaitFor;

use crate::config::{TaskDef, TaskKind};
use crate::error::InterpolationResult;
use crate::runner::{Resolver, Task, TaskMeta};
use crate::template::Value;
use std::collections::BTreeMap;

/// Build the runtime task for a task definition
pub fn build(def: TaskDef) -> Box<dyn Task> {
    let meta = TaskMeta {
        name: def.name,
        description: def.description,
        before: def.before,
        after: def.after,
    };

    match def.kind {
        TaskKind::EnsureDir(d) => Box::new(EnsureDir::new(meta, d)),
        TaskKind::EnsureFile(d) => Box::new(EnsureFile::new(meta, d)),
        TaskKind::CopyDir(d) => Box::new(CopyDir::new(meta, d)),
        TaskKind::Symlink(d) => Box::new(Symlink::new(meta, d)),
        TaskKind::Script(d) => Box::new(Script::new(meta, d)),
        TaskKind::Checkout(d) => Box::new(Checkout::new(meta, d)),
        TaskKind::InstallTarball(d) => Box::new(InstallTarball::new(meta, d)),
        TaskKind::RequireVersion(d) => Box::new(RequireVersion::new(meta, d)),
        TaskKind::WaitFor(d) => Box::new(WaitFor::new(meta, d)),
        TaskKind::Confirm(d) => Box::new(Confirm::new(meta, d)),
        TaskKind::Conditional(d) => {
            let mut task = Conditional::new(meta);
            for branch in d.when {
                task = task.when(branch.condition, build(*branch.task));
            }
            if let Some(default) = d.default {
                task = task.otherwise(build(*default));
            }
            Box::new(task)
        }
        TaskKind::ForEach(d) => Box::new(ForEach::new(meta, d.over, d.var, build(*d.task))),
    }
}

fn text(cx: &Resolver<'_>, field: &str, source: &str) -> InterpolationResult<Option<Value>> {
    cx.render_value(field, source).map(Some)
}

/// An unset optional field reads as `None` rather than being undefined
fn optional(
    cx: &Resolver<'_>,
    field: &str,
    source: Option<&str>,
) -> InterpolationResult<Option<Value>> {
    match source {
        Some(source) => text(cx, field, source),
        None => Ok(Some(Value::None)),
    }
}

fn list(cx: &Resolver<'_>, field: &str, sources: &[String]) -> InterpolationResult<Option<Value>> {
    cx.render_list_value(field, sources).map(Some)
}

fn map(
    cx: &Resolver<'_>,
    field: &str,
    sources: &BTreeMap<String, String>,
) -> InterpolationResult<Option<Value>> {
    sources
        .iter()
        .map(|(key, source)| Ok((key.clone(), cx.render_value(field, source)?)))
        .collect::<InterpolationResult<BTreeMap<_, _>>>()
        .map(|rendered| Some(Value::Map(rendered)))
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::runner::{Environment, Maker, Project, RunReport, Sequencer, Task};
    use crate::ui::{Logger, Verbosity};
    use std::path::Path;

    /// Run one task as the only task of project `app`, rooted at `base`
    pub fn run_task(task: Box<dyn Task>, base: &Path, simulate: bool) -> (RunReport, Vec<String>) {
        let project = Project::new("app").with_task(task);
        let env = Environment::new(base.to_path_buf()).with_simulate(simulate);
        let maker = Maker::new(Logger::capturing(Verbosity::Verbose))
            .with_simulate(simulate)
            .with_interactive(false);
        let mut sequencer = Sequencer::new(env, maker);
        let report = sequencer.run_project(&project);
        (report, sequencer.maker().log().captured().to_vec())
    }

    /// Build a task from YAML
    pub fn task(yaml: &str) -> Box<dyn Task> {
        super::build(serde_yaml::from_str(yaml).unwrap())
    }
}
