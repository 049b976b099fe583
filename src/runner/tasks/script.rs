//! Run an arbitrary command

use super::{list, map, optional};
use crate::config::ScriptDef;
use crate::error::{InterpolationResult, Result};
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Script {
    meta: TaskMeta,
    def: ScriptDef,
}

impl Script {
    pub fn new(meta: TaskMeta, def: ScriptDef) -> Self {
        Script { meta, def }
    }
}

impl Task for Script {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "script"
    }

    fn default_description(&self) -> &'static str {
        "Run {{task.command}}{{if task.cwd}} in {{task.cwd}}{{endif}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["command", "cwd", "env"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "command" => list(cx, name, &self.def.command),
            "cwd" => optional(cx, name, self.def.cwd.as_deref()),
            "env" => map(cx, name, &self.def.env),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let argv = cx.field_list("command")?;
        let cwd = cx
            .field_opt("cwd")?
            .map(|dir| cx.env().resolve_path(&dir));
        let env = match cx.field("env")? {
            Value::Map(vars) => vars
                .into_iter()
                .map(|(key, value)| (key, value.to_string()))
                .collect(),
            _ => BTreeMap::new(),
        };

        maker.run_command(&argv, cwd.as_deref(), &env)?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::testing::{run_task, task};
    use crate::error::{ExecutionError, RassembleError};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_script_with_cwd_and_env() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("work")).unwrap();
        let yaml = r#"
name: greet
script:
  command: [sh, -c, "echo $GREETING > greeting.txt"]
  cwd: work
  env:
    GREETING: "hello {{project.name}}"
"#;
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("work/greeting.txt")).unwrap(),
            "hello app\n"
        );
        assert_eq!(report.descriptions()[0], "Run sh -c echo $GREETING > greeting.txt in work");
    }

    #[test]
    fn test_script_failure_surfaces_output() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: broken\nscript: { command: [sh, -c, 'echo nope >&2; exit 4'] }\n";
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        let error = report.error.expect("script should fail");
        match error.root() {
            RassembleError::Execution(ExecutionError::CommandFailed { code, output, .. }) => {
                assert_eq!(*code, Some(4));
                assert!(output.contains("nope"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
