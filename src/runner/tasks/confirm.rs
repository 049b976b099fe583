//! Ask the operator before continuing

use super::text;
use crate::config::ConfirmDef;
use crate::error::{ExecutionError, InterpolationResult, Result};
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;

#[derive(Debug)]
pub struct Confirm {
    meta: TaskMeta,
    def: ConfirmDef,
}

impl Confirm {
    pub fn new(meta: TaskMeta, def: ConfirmDef) -> Self {
        Confirm { meta, def }
    }
}

impl Task for Confirm {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "confirm"
    }

    fn default_description(&self) -> &'static str {
        "Ask: {{task.question}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["question"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "question" => text(cx, name, &self.def.question),
            "default" => Ok(Some(Value::Bool(self.def.default))),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let question = cx.field_str("question")?;
        if maker.ask(&question, self.def.default)? {
            Ok(())
        } else {
            Err(ExecutionError::Declined(question).into())
        }
    }
}
