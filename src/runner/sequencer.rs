//! Sequential, fail-fast task execution
//!
//! Every task, nested ones included, passes through [`execute_task`]:
//!
//! ```text
//! Pending -> UpToDate
//!         -> Running -> Succeeded | Simulated | Failed
//! ```
//!
//! The first failure stops the project. Nothing already done is rolled back.

use crate::error::{RassembleError, Result};
use crate::runner::{Environment, Maker, Project, Resolver, Task};
use std::fmt;
use tracing::{debug, info_span};

/// Lifecycle state of one task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    UpToDate,
    Running,
    Succeeded,
    /// Would have run, but simulate mode was on
    Simulated,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Pending => "pending",
            TaskState::UpToDate => "up to date",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Simulated => "simulated",
            TaskState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What happened to one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Rendered task name (the raw template when rendering failed)
    pub name: String,

    /// Nesting depth; tasks run by composites are one deeper than their parent
    pub depth: usize,

    pub state: TaskState,

    /// Rendered description
    pub description: String,
}

/// Outcome of running one project
#[derive(Debug)]
pub struct RunReport {
    pub project: String,
    pub outcomes: Vec<TaskOutcome>,
    pub error: Option<RassembleError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `(name, state)` for every task reached
    pub fn states(&self) -> Vec<(&str, TaskState)> {
        self.outcomes
            .iter()
            .map(|o| (o.name.as_str(), o.state))
            .collect()
    }

    /// Rendered descriptions in execution order
    pub fn descriptions(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.description.as_str()).collect()
    }

    /// Number of tasks that ended in `state`
    pub fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// The failure, if any, as an error
    pub fn into_result(self) -> Result<Vec<TaskOutcome>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.outcomes),
        }
    }
}

/// Drive one task through its lifecycle
///
/// Failures are wrapped in [`RassembleError::TaskFailed`] naming the task.
pub fn execute_task(task: &dyn Task, parent: &Resolver<'_>, maker: &mut Maker) -> Result<TaskState> {
    let cx = parent.for_task(task);
    let raw_name = &task.meta().name;

    let name = match cx.render("name", raw_name) {
        Ok(name) => name,
        Err(error) => return Err(failed(raw_name, error.into())),
    };
    let _span = info_span!("task", name = %name, kind = task.kind()).entered();

    let description_template = task
        .meta()
        .description
        .as_deref()
        .unwrap_or_else(|| task.default_description());
    let description = match cx.render("description", description_template) {
        Ok(description) => description,
        Err(error) => return Err(failed(&name, error.into())),
    };

    let depth = maker.log().depth();
    let index = maker.record(TaskOutcome {
        name: name.clone(),
        depth,
        state: TaskState::Pending,
        description: description.clone(),
    });
    maker.logger().task_start(&name, &description);

    match drive(task, &cx, maker, index) {
        Ok(state) => {
            maker.set_state(index, state);
            debug!(%state, "task finished");
            Ok(state)
        }
        Err(error) => {
            maker.set_state(index, TaskState::Failed);
            Err(failed(&name, error))
        }
    }
}

fn drive(task: &dyn Task, cx: &Resolver<'_>, maker: &mut Maker, index: usize) -> Result<TaskState> {
    if task.is_up_to_date(cx, maker)? {
        maker.logger().indent();
        maker.logger().notify("Up to date");
        maker.logger().dedent();
        return Ok(TaskState::UpToDate);
    }
    maker.set_state(index, TaskState::Running);

    // Resolve every field before any effect
    for field in task.field_names() {
        cx.field(field)?;
    }
    let before = render_hooks(cx, "before", &task.meta().before)?;
    let after = render_hooks(cx, "after", &task.meta().after)?;

    maker.logger().indent();
    let result = run_with_hooks(task, cx, maker, &before, &after);
    maker.logger().dedent();
    result?;

    if maker.is_simulate() {
        Ok(TaskState::Simulated)
    } else {
        Ok(TaskState::Succeeded)
    }
}

fn run_with_hooks(
    task: &dyn Task,
    cx: &Resolver<'_>,
    maker: &mut Maker,
    before: &[Vec<String>],
    after: &[Vec<String>],
) -> Result<()> {
    let no_env = Default::default();

    // Run before hooks
    for hook in before {
        maker.run_command(hook, None, &no_env)?;
    }

    if maker.is_simulate() && !task.is_composite() {
        maker.logger().would(&format!("run {} task", task.kind()));
    } else {
        task.run(cx, maker)?;
    }

    // Run after hooks
    for hook in after {
        maker.run_command(hook, None, &no_env)?;
    }
    Ok(())
}

fn render_hooks(cx: &Resolver<'_>, field: &str, hooks: &[Vec<String>]) -> Result<Vec<Vec<String>>> {
    let rendered = hooks
        .iter()
        .map(|argv| {
            argv.iter()
                .map(|arg| cx.render(field, arg))
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rendered)
}

fn failed(task: &str, source: RassembleError) -> RassembleError {
    RassembleError::TaskFailed {
        task: task.to_string(),
        source: Box::new(source),
    }
}

/// Runs projects against one environment
pub struct Sequencer {
    env: Environment,
    maker: Maker,
}

impl Sequencer {
    pub fn new(env: Environment, maker: Maker) -> Self {
        Sequencer { env, maker }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn maker(&self) -> &Maker {
        &self.maker
    }

    /// Run every task of a project in order, stopping at the first failure
    pub fn run_project(&mut self, project: &Project) -> RunReport {
        let _span = info_span!("project", name = %project.name).entered();
        self.maker.logger().notify(&format!(
            "== {} ({}) ==",
            project.display_title(),
            project.name
        ));

        let cx = Resolver::new(&self.env, project);
        let mut error = None;
        for task in &project.tasks {
            if let Err(e) = execute_task(task.as_ref(), &cx, &mut self.maker) {
                error = Some(e);
                break;
            }
        }

        RunReport {
            project: project.name.clone(),
            outcomes: self.maker.take_journal(),
            error,
        }
    }

    /// Run projects in order; projects after a failing one are not started
    pub fn run_projects<'p, I>(&mut self, projects: I) -> Vec<RunReport>
    where
        I: IntoIterator<Item = &'p Project>,
    {
        let mut reports = Vec::new();
        for project in projects {
            let report = self.run_project(project);
            let stop = !report.is_success();
            reports.push(report);
            if stop {
                break;
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, InterpolationError, InterpolationResult};
    use crate::runner::TaskMeta;
    use crate::template::Value;
    use crate::ui::{Logger, Verbosity};
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Counter {
        meta: TaskMeta,
        up_to_date: bool,
        fail: bool,
        runs: Rc<Cell<usize>>,
    }

    impl Counter {
        fn new(name: &str, runs: &Rc<Cell<usize>>) -> Self {
            Counter {
                meta: TaskMeta::named(name),
                up_to_date: false,
                fail: false,
                runs: Rc::clone(runs),
            }
        }
    }

    impl Task for Counter {
        fn meta(&self) -> &TaskMeta {
            &self.meta
        }
        fn kind(&self) -> &'static str {
            "counter"
        }
        fn default_description(&self) -> &'static str {
            "Count {{task.name}} in {{project.name}}"
        }
        fn field_names(&self) -> &'static [&'static str] {
            &[]
        }
        fn attribute(&self, _name: &str, _cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
            Ok(None)
        }
        fn is_up_to_date(&self, _cx: &Resolver<'_>, _maker: &mut Maker) -> Result<bool> {
            Ok(self.up_to_date)
        }
        fn run(&self, _cx: &Resolver<'_>, _maker: &mut Maker) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.fail {
                return Err(ExecutionError::Declined(self.meta.name.clone()).into());
            }
            Ok(())
        }
    }

    fn sequencer(simulate: bool) -> Sequencer {
        let env = Environment::new(PathBuf::from("/srv")).with_simulate(simulate);
        let maker = Maker::new(Logger::capturing(Verbosity::Verbose))
            .with_simulate(simulate)
            .with_interactive(false);
        Sequencer::new(env, maker)
    }

    #[test]
    fn test_up_to_date_skips_action() {
        let runs = Rc::new(Cell::new(0));
        let mut task = Counter::new("current", &runs);
        task.up_to_date = true;
        let project = Project::new("app").with_task(Box::new(task));

        let report = sequencer(false).run_project(&project);
        assert!(report.is_success());
        assert_eq!(runs.get(), 0);
        assert_eq!(report.states(), vec![("current", TaskState::UpToDate)]);
    }

    #[test]
    fn test_fail_fast() {
        let runs = Rc::new(Cell::new(0));
        let mut second = Counter::new("second", &runs);
        second.fail = true;
        let project = Project::new("app")
            .with_task(Box::new(Counter::new("first", &runs)))
            .with_task(Box::new(second))
            .with_task(Box::new(Counter::new("third", &runs)));

        let report = sequencer(false).run_project(&project);
        assert_eq!(runs.get(), 2);
        assert_eq!(
            report.states(),
            vec![("first", TaskState::Succeeded), ("second", TaskState::Failed)]
        );
        let error = report.error.expect("second task should fail");
        assert!(matches!(error, RassembleError::TaskFailed { ref task, .. } if task == "second"));
        assert!(matches!(
            error.root(),
            RassembleError::Execution(ExecutionError::Declined(_))
        ));
    }

    #[test]
    fn test_simulate_runs_nothing_but_describes_everything() {
        let runs = Rc::new(Cell::new(0));
        let build = || {
            Project::new("app")
                .with_task(Box::new(Counter::new("one", &runs)))
                .with_task(Box::new(Counter::new("two", &runs)))
        };

        let simulated = sequencer(true).run_project(&build());
        assert_eq!(runs.get(), 0);
        assert_eq!(simulated.count(TaskState::Simulated), 2);

        let real = sequencer(false).run_project(&build());
        assert_eq!(runs.get(), 2);
        assert_eq!(simulated.descriptions(), real.descriptions());
        assert_eq!(real.descriptions(), vec!["Count one in app", "Count two in app"]);
    }

    #[test]
    fn test_bad_description_fails_before_any_effect() {
        let runs = Rc::new(Cell::new(0));
        let mut task = Counter::new("broken", &runs);
        task.meta.description = Some("{{config.missing}}".to_string());
        let project = Project::new("app").with_task(Box::new(task));

        let report = sequencer(false).run_project(&project);
        assert_eq!(runs.get(), 0);
        assert!(report.outcomes.is_empty());
        let error = report.error.expect("description should fail");
        match error.root() {
            RassembleError::Interpolation(e) => assert_eq!(
                e.kind(),
                &InterpolationError::UndefinedName("config.missing".to_string())
            ),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_hooks_wrap_the_action() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let log = temp_dir.path().join("hooks.log");
        let runs = Rc::new(Cell::new(0));
        let mut task = Counter::new("hooked", &runs);
        let append = |word: &str| {
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("echo {} >> {}", word, log.display()),
            ]
        };
        task.meta.before = vec![append("before")];
        task.meta.after = vec![append("after-{{project.name}}")];
        let project = Project::new("app").with_task(Box::new(task));

        let report = sequencer(false).run_project(&project);
        assert!(report.is_success());
        assert_eq!(runs.get(), 1);
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "before\nafter-app\n"
        );
    }

    #[test]
    fn test_later_projects_skipped_after_failure() {
        let runs = Rc::new(Cell::new(0));
        let mut failing = Counter::new("boom", &runs);
        failing.fail = true;
        let projects = vec![
            Project::new("a").with_task(Box::new(failing)),
            Project::new("b").with_task(Box::new(Counter::new("never", &runs))),
        ];

        let reports = sequencer(false).run_projects(&projects);
        assert_eq!(reports.len(), 1);
        assert_eq!(runs.get(), 1);
    }
}
