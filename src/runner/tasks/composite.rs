//! Tasks that select or repeat other tasks

use crate::error::{InterpolationResult, Result};
use crate::runner::sequencer::execute_task;
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;

/// Run the first task whose condition is truthy, else the default task
#[derive(Debug)]
pub struct Conditional {
    meta: TaskMeta,
    branches: Vec<(String, Box<dyn Task>)>,
    default: Option<Box<dyn Task>>,
}

impl Conditional {
    pub fn new(meta: TaskMeta) -> Self {
        Conditional {
            meta,
            branches: Vec::new(),
            default: None,
        }
    }

    /// Add a branch; `condition` is a template read as a boolean
    pub fn when(mut self, condition: impl Into<String>, task: Box<dyn Task>) -> Self {
        self.branches.push((condition.into(), task));
        self
    }

    /// Task to run when no condition holds
    pub fn otherwise(mut self, task: Box<dyn Task>) -> Self {
        self.default = Some(task);
        self
    }

    fn select(&self, cx: &Resolver<'_>) -> InterpolationResult<Option<&dyn Task>> {
        for (i, (condition, task)) in self.branches.iter().enumerate() {
            if cx.condition(&format!("when[{}].condition", i), condition)? {
                return Ok(Some(task.as_ref()));
            }
        }
        Ok(self.default.as_deref())
    }
}

impl Task for Conditional {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "conditional"
    }

    fn default_description(&self) -> &'static str {
        "Run the first of {{task.branches}} tasks whose condition holds"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn attribute(&self, name: &str, _cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "branches" => Ok(Some(Value::Int(self.branches.len() as i64))),
            _ => Ok(None),
        }
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        match self.select(cx)? {
            Some(task) => {
                execute_task(task, cx, maker)?;
            }
            None => maker.logger().notify("No condition matched"),
        }
        Ok(())
    }
}

/// Run a task once per item, with the item bound to a loop variable
#[derive(Debug)]
pub struct ForEach {
    meta: TaskMeta,
    over: String,
    var: String,
    task: Box<dyn Task>,
}

impl ForEach {
    /// `over` is an expression; a list is iterated and a string is split on whitespace
    pub fn new(meta: TaskMeta, over: impl Into<String>, var: impl Into<String>, task: Box<dyn Task>) -> Self {
        ForEach {
            meta,
            over: over.into(),
            var: var.into(),
            task,
        }
    }
}

impl Task for ForEach {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "for-each"
    }

    fn default_description(&self) -> &'static str {
        "Repeat for each {{task.var}} in {{task.items}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["items"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "over" => Ok(Some(Value::Str(self.over.clone()))),
            "var" => Ok(Some(Value::Str(self.var.clone()))),
            "items" => cx
                .evaluate("over", &self.over)
                .map(|value| Some(Value::List(value.into_items()))),
            _ => Ok(None),
        }
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let items = cx.field("items")?.into_items();
        for item in items {
            let scope = cx.with_local(&self.var, item);
            execute_task(self.task.as_ref(), &scope, maker)?;
        }
        Ok(())
    }
}
