//! Poll until a service is ready

use super::{list, optional};
use crate::config::WaitForDef;
use crate::error::{ExecutionError, InterpolationResult, Result};
use crate::runner::maker::display_command;
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use regex::Regex;
use std::thread;
use std::time::{Duration, Instant};

/// Run a check command until it succeeds (and its output matches `expect`)
///
/// Running out of time is logged as a warning, not treated as a failure.
#[derive(Debug)]
pub struct WaitFor {
    meta: TaskMeta,
    def: WaitForDef,
}

impl WaitFor {
    pub fn new(meta: TaskMeta, def: WaitForDef) -> Self {
        WaitFor { meta, def }
    }
}

impl Task for WaitFor {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "wait-for"
    }

    fn default_description(&self) -> &'static str {
        "Wait up to {{task.timeout_ms}}ms for {{task.command}} to succeed"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["command", "expect"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "command" => list(cx, name, &self.def.command),
            "expect" => optional(cx, name, self.def.expect.as_deref()),
            "interval_ms" => Ok(Some(Value::Int(self.def.interval_ms as i64))),
            "timeout_ms" => Ok(Some(Value::Int(self.def.timeout_ms as i64))),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let argv = cx.field_list("command")?;
        let expect = match cx.field_opt("expect")? {
            Some(pattern) => Some(Regex::new(&pattern).map_err(|e| ExecutionError::InvalidInput {
                name: "expect".to_string(),
                error: e.to_string(),
            })?),
            None => None,
        };

        let interval = Duration::from_millis(self.def.interval_ms);
        let deadline = Instant::now() + Duration::from_millis(self.def.timeout_ms);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let (success, output) = maker.check_output(&argv, None);
            let matched = expect.as_ref().map_or(true, |re| re.is_match(&output));
            if success && matched {
                maker
                    .logger()
                    .debug(&format!("Ready after {} attempt(s)", attempts));
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                maker.logger().warn(&format!(
                    "Gave up waiting for {} after {}ms",
                    display_command(&argv),
                    self.def.timeout_ms
                ));
                return Ok(());
            }
            thread::sleep(interval.min(deadline - now));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::testing::{run_task, task};
    use crate::runner::TaskState;
    use tempfile::TempDir;

    #[test]
    fn test_ready_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: wait\nwait-for: { command: [echo, listening], expect: 'listen', interval_ms: 10, timeout_ms: 1000 }\n";
        let (report, log) = run_task(task(yaml), temp_dir.path(), false);
        assert_eq!(report.states(), vec![("wait", TaskState::Succeeded)]);
        assert!(log.iter().any(|line| line.contains("Ready after 1 attempt(s)")));
    }

    #[test]
    fn test_timeout_warns_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: wait\nwait-for: { command: [\"false\"], interval_ms: 10, timeout_ms: 50 }\n";
        let (report, log) = run_task(task(yaml), temp_dir.path(), false);
        assert!(report.is_success());
        assert!(log.iter().any(|line| line.contains("Warning: Gave up waiting for false after 50ms")));
    }
}
