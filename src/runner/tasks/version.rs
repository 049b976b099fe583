//! Toolchain version preconditions

use super::{list, optional};
use crate::config::RequireVersionDef;
use crate::error::{InterpolationResult, Result, VersionError};
use crate::runner::maker::display_command;
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)+|\d+").expect("version regex is valid"))
}

/// The first version number in a command's output, preferring dotted versions
pub fn extract_version(output: &str) -> Option<String> {
    let mut fallback = None;
    for m in version_regex().find_iter(output) {
        if m.as_str().contains('.') {
            return Some(m.as_str().to_string());
        }
        fallback.get_or_insert_with(|| m.as_str().to_string());
    }
    fallback
}

/// Compare dotted versions numerically; missing components count as zero
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let ordering = a.get(i).unwrap_or(&0).cmp(b.get(i).unwrap_or(&0));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Fail unless a command reports a version within bounds
///
/// `minimum` is inclusive and `maximum` exclusive.
#[derive(Debug)]
pub struct RequireVersion {
    meta: TaskMeta,
    def: RequireVersionDef,
}

impl RequireVersion {
    pub fn new(meta: TaskMeta, def: RequireVersionDef) -> Self {
        RequireVersion { meta, def }
    }
}

impl Task for RequireVersion {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "require-version"
    }

    fn default_description(&self) -> &'static str {
        "Check the version reported by {{task.command}}\
         {{if task.minimum}} (at least {{task.minimum}}){{endif}}\
         {{if task.maximum}} (below {{task.maximum}}){{endif}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["command", "minimum", "maximum"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "command" => list(cx, name, &self.def.command),
            "minimum" => optional(cx, name, self.def.minimum.as_deref()),
            "maximum" => optional(cx, name, self.def.maximum.as_deref()),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let argv = cx.field_list("command")?;
        let tool = display_command(&argv);
        let output = maker.run_command(&argv, None, &BTreeMap::new())?;

        let found = extract_version(&output).ok_or_else(|| VersionError::Unparseable {
            tool: tool.clone(),
            output: output.trim().to_string(),
        })?;

        let minimum = cx.field_opt("minimum")?;
        let maximum = cx.field_opt("maximum")?;
        let too_old = minimum
            .as_deref()
            .is_some_and(|min| compare_versions(&found, min) == Ordering::Less);
        let too_new = maximum
            .as_deref()
            .is_some_and(|max| compare_versions(&found, max) != Ordering::Less);

        if too_old || too_new {
            let requirement = match (&minimum, &maximum) {
                (Some(min), Some(max)) => format!(">= {}, < {}", min, max),
                (Some(min), None) => format!(">= {}", min),
                (None, Some(max)) => format!("< {}", max),
                (None, None) => String::new(),
            };
            return Err(VersionError::Incompatible {
                tool,
                found,
                requirement,
            }
            .into());
        }

        maker
            .logger()
            .notify(&format!("Found {} version {}", tool, found));
        Ok(())
    }
}
