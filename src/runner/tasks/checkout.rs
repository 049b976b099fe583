//! Git checkouts

use super::{optional, text};
use crate::config::CheckoutDef;
use crate::error::{InterpolationResult, Result};
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Clone a repository, or fast-forward an existing clone
#[derive(Debug)]
pub struct Checkout {
    meta: TaskMeta,
    def: CheckoutDef,
}

impl Checkout {
    pub fn new(meta: TaskMeta, def: CheckoutDef) -> Self {
        Checkout { meta, def }
    }

    fn url(&self, cx: &Resolver<'_>) -> InterpolationResult<String> {
        let repository = cx.field_str("repository")?;
        Ok(match cx.field_opt("base_repository")? {
            Some(base) => join_url(&base, &repository),
            None => repository,
        })
    }
}

/// `base/repository`, with exactly one slash between them
pub fn join_url(base: &str, repository: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        repository.trim_start_matches('/')
    )
}

fn git(args: &[&str]) -> Vec<String> {
    std::iter::once("git")
        .chain(args.iter().copied())
        .map(String::from)
        .collect()
}

impl Task for Checkout {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "checkout"
    }

    fn default_description(&self) -> &'static str {
        "Check out {{task.url}} into {{task.dest}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["repository", "dest", "base_repository", "url"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "repository" => text(cx, name, &self.def.repository),
            "dest" => text(cx, name, &self.def.dest),
            "base_repository" => optional(cx, name, self.def.base_repository.as_deref()),
            "create_if_necessary" => Ok(Some(Value::Bool(self.def.create_if_necessary))),
            "url" => self.url(cx).map(|url| Some(Value::Str(url))),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let url = self.url(cx)?;
        let dest = cx.field_path("dest")?;
        let dest_str = dest.to_string_lossy().into_owned();
        let no_env = BTreeMap::new();

        // Existing checkout: fast-forward only
        if dest.join(".git").exists() {
            maker.run_command(&git(&["-C", dest_str.as_str(), "pull", "--ff-only"]), None, &no_env)?;
            return Ok(());
        }

        // Fresh clone, falling back to an empty repository
        let cloned = maker.run_command(&git(&["clone", url.as_str(), dest_str.as_str()]), None, &no_env);
        match cloned {
            Ok(_) => Ok(()),
            Err(error) if self.def.create_if_necessary => {
                maker
                    .logger()
                    .warn(&format!("Could not clone {}; creating a new repository", url));
                tracing::debug!(%error, "clone failed");
                init_repository(maker, &dest, &url)
            }
            Err(error) => Err(error),
        }
    }
}

fn init_repository(maker: &mut Maker, dest: &Path, url: &str) -> Result<()> {
    let dest_str = dest.to_string_lossy().into_owned();
    let no_env = BTreeMap::new();
    maker.ensure_dir(dest)?;
    maker.run_command(&git(&["init", dest_str.as_str()]), None, &no_env)?;
    maker.run_command(&git(&["-C", dest_str.as_str(), "remote", "add", "origin", url]), None, &no_env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_task, task};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://git.example.org/", "/app.git"), "https://git.example.org/app.git");
        assert_eq!(join_url("ssh://host/repos", "app"), "ssh://host/repos/app");
    }

    #[test]
    fn test_description_uses_joined_url() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = r#"
name: sources
checkout:
  repository: "{{project.name}}.git"
  base_repository: https://git.example.org/
  dest: src/app
"#;
        let (report, _) = run_task(task(yaml), temp_dir.path(), true);
        assert_eq!(
            report.descriptions(),
            vec!["Check out https://git.example.org/app.git into src/app"]
        );
        assert!(!temp_dir.path().join("src").exists());
    }
}
