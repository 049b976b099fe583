//! Common test utilities

#![allow(dead_code)]

use rassemble::error::{ExecutionError, InterpolationResult, Result};
use rassemble::runner::{Environment, Maker, Resolver, Sequencer, Task, TaskMeta};
use rassemble::template::Value;
use rassemble::ui::{Logger, Verbosity};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Create a temporary directory with a rassemble.yml file
pub fn create_test_project(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let project_path = temp_dir.path().join("rassemble.yml");
    fs::write(&project_path, content).unwrap();
    (temp_dir, project_path)
}

/// Create a test project file with an empty subdirectory next to it
pub fn create_test_project_in_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let project_path = temp_dir.path().join("rassemble.yml");
    let sub_dir = temp_dir.path().join("subdir");

    fs::write(&project_path, content).unwrap();
    fs::create_dir(&sub_dir).unwrap();

    (temp_dir, project_path, sub_dir)
}

/// A sequencer rooted at `base` that records output instead of printing it
pub fn sequencer(base: &Path, simulate: bool) -> Sequencer {
    let env = Environment::new(base.to_path_buf()).with_simulate(simulate);
    let maker = Maker::new(Logger::capturing(Verbosity::Verbose))
        .with_simulate(simulate)
        .with_interactive(false);
    Sequencer::new(env, maker)
}

/// Shared log of recorder runs: (task name, rendered `note` field)
pub type RunLog = Rc<RefCell<Vec<(String, String)>>>;

/// A task that records each run instead of causing effects
#[derive(Debug)]
pub struct Recorder {
    meta: TaskMeta,
    note: String,
    up_to_date: bool,
    fail: bool,
    log: RunLog,
}

impl Recorder {
    pub fn new(name: &str, log: &RunLog) -> Self {
        Recorder {
            meta: TaskMeta::named(name),
            note: String::new(),
            up_to_date: false,
            fail: false,
            log: Rc::clone(log),
        }
    }

    /// Template rendered into the run log
    pub fn note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }

    pub fn up_to_date(mut self) -> Self {
        self.up_to_date = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self)
    }
}

impl Task for Recorder {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "recorder"
    }

    fn default_description(&self) -> &'static str {
        "Record {{task.note}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["note"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "note" => cx.render_value(name, &self.note).map(Some),
            _ => Ok(None),
        }
    }

    fn is_up_to_date(&self, _cx: &Resolver<'_>, _maker: &mut Maker) -> Result<bool> {
        Ok(self.up_to_date)
    }

    fn run(&self, cx: &Resolver<'_>, _maker: &mut Maker) -> Result<()> {
        let name = cx.field_str("name")?;
        let note = cx.field_str("note")?;
        self.log.borrow_mut().push((name.clone(), note));
        if self.fail {
            return Err(ExecutionError::Declined(name).into());
        }
        Ok(())
    }
}

pub fn run_log() -> RunLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Names of the recorded runs, in order
pub fn runs(log: &RunLog) -> Vec<String> {
    log.borrow().iter().map(|(name, _)| name.clone()).collect()
}
