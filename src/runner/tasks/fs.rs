//! Filesystem tasks

use super::{list, optional, text};
use crate::config::{CopyDirDef, EnsureDirDef, EnsureFileDef, SymlinkDef};
use crate::error::{ExecutionError, InterpolationError, InterpolationResult, Result};
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const TEMPLATE_SUFFIX: &str = ".tmpl";

/// Create a directory
#[derive(Debug)]
pub struct EnsureDir {
    meta: TaskMeta,
    def: EnsureDirDef,
}

impl EnsureDir {
    pub fn new(meta: TaskMeta, def: EnsureDirDef) -> Self {
        EnsureDir { meta, def }
    }
}

impl Task for EnsureDir {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "ensure-dir"
    }

    fn default_description(&self) -> &'static str {
        "Create directory {{task.path}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["path"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "path" => text(cx, name, &self.def.path),
            _ => Ok(None),
        }
    }

    fn is_up_to_date(&self, cx: &Resolver<'_>, _maker: &mut Maker) -> Result<bool> {
        Ok(cx.field_path("path")?.is_dir())
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        maker.ensure_dir(&cx.field_path("path")?)?;
        Ok(())
    }
}

/// Write a file with the given content
#[derive(Debug)]
pub struct EnsureFile {
    meta: TaskMeta,
    def: EnsureFileDef,
}

impl EnsureFile {
    pub fn new(meta: TaskMeta, def: EnsureFileDef) -> Self {
        EnsureFile { meta, def }
    }
}

impl Task for EnsureFile {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "ensure-file"
    }

    fn default_description(&self) -> &'static str {
        "Write {{task.path}}{{if task.executable}} (executable){{endif}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["path", "content", "executable", "overwrite"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "path" => text(cx, name, &self.def.path),
            "content" => text(cx, name, &self.def.content),
            "executable" => Ok(Some(Value::Bool(self.def.executable))),
            "overwrite" => Ok(Some(Value::Bool(self.def.overwrite))),
            _ => Ok(None),
        }
    }

    fn is_up_to_date(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<bool> {
        let path = cx.field_path("path")?;
        let content = cx.field_str("content")?;
        Ok(maker.file_matches(&path, &content, self.def.executable))
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let path = cx.field_path("path")?;
        let content = cx.field_str("content")?;
        maker.ensure_file(&path, &content, self.def.executable, self.def.overwrite)?;
        Ok(())
    }
}

/// Copy a directory tree, rendering `*.tmpl` files on the way
#[derive(Debug)]
pub struct CopyDir {
    meta: TaskMeta,
    def: CopyDirDef,
}

impl CopyDir {
    pub fn new(meta: TaskMeta, def: CopyDirDef) -> Self {
        CopyDir { meta, def }
    }

    fn excludes(&self, cx: &Resolver<'_>) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in cx.field_list("exclude")? {
            let glob = Glob::new(&pattern).map_err(|e| ExecutionError::InvalidInput {
                name: "exclude".to_string(),
                error: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ExecutionError::InvalidInput {
            name: "exclude".to_string(),
            error: e.to_string(),
        })?;
        Ok(set)
    }
}

impl Task for CopyDir {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "copy-dir"
    }

    fn default_description(&self) -> &'static str {
        "Copy {{task.source}} to {{task.dest}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["source", "dest", "exclude"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "source" => text(cx, name, &self.def.source),
            "dest" => text(cx, name, &self.def.dest),
            "exclude" => list(cx, name, &self.def.exclude),
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let source = cx.field_path("source")?;
        let dest = cx.field_path("dest")?;
        if !source.is_dir() {
            return Err(ExecutionError::InvalidInput {
                name: "source".to_string(),
                error: format!("{} is not a directory", source.display()),
            }
            .into());
        }

        let excludes = self.excludes(cx)?;
        let files = collect_files(&source, &excludes)?;

        let mut changed = 0;
        for relative in &files {
            let from = source.join(relative);
            let relative_str = relative.to_string_lossy();
            let changed_file = match relative_str.strip_suffix(TEMPLATE_SUFFIX) {
                Some(stripped) => {
                    let template = fs::read_to_string(&from)?;
                    let rendered = cx.render(&relative_str, &template)?;
                    maker.ensure_file(&dest.join(stripped), &rendered, false, true)?
                }
                None => maker.copy_file(&from, &dest.join(relative))?,
            };
            if changed_file {
                changed += 1;
            }
        }

        maker
            .logger()
            .debug(&format!("{} of {} files updated", changed, files.len()));
        Ok(())
    }
}

/// Relative paths of every file under `root`, skipping excluded entries and their subtrees
fn collect_files(root: &Path, excludes: &GlobSet) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            // The root itself is never excluded
            Ok(relative) if relative.as_os_str().is_empty() => true,
            Ok(relative) => !excludes.is_match(relative),
            Err(_) => true,
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => io,
            None => std::io::Error::other("filesystem loop while copying"),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Symlink every file matching a glob into a directory
#[derive(Debug)]
pub struct Symlink {
    meta: TaskMeta,
    def: SymlinkDef,
}

impl Symlink {
    pub fn new(meta: TaskMeta, def: SymlinkDef) -> Self {
        Symlink { meta, def }
    }

    /// Glob matches split into (kept, excluded count)
    fn matches(&self, cx: &Resolver<'_>) -> InterpolationResult<(Vec<PathBuf>, usize)> {
        let pattern = cx.field_path("source_glob")?;
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            InterpolationError::Evaluation(format!("invalid source_glob {:?}: {}", pattern, e))
        })?;

        let exclude = match cx.field_opt("exclude_glob")? {
            Some(ex) => Some(glob::Pattern::new(&ex).map_err(|e| {
                InterpolationError::Evaluation(format!("invalid exclude_glob {:?}: {}", ex, e))
            })?),
            None => None,
        };

        let mut kept = Vec::new();
        let mut excluded = 0;
        for path in paths.flatten() {
            let is_excluded = exclude.as_ref().is_some_and(|ex| {
                ex.matches_path(&path)
                    || path
                        .file_name()
                        .is_some_and(|name| ex.matches(&name.to_string_lossy()))
            });
            if is_excluded {
                excluded += 1;
            } else {
                kept.push(path);
            }
        }
        Ok((kept, excluded))
    }
}

impl Task for Symlink {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "symlink"
    }

    fn default_description(&self) -> &'static str {
        "Symlink {{len(task.source_files)}} files matching {{task.source_glob}} into {{task.dest_dir}}\
         {{if task.exclude_count}} ({{task.exclude_count}} excluded by {{task.exclude_glob}}){{endif}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["source_glob", "dest_dir", "exclude_glob"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "source_glob" => text(cx, name, &self.def.source_glob),
            "dest_dir" => text(cx, name, &self.def.dest_dir),
            "exclude_glob" => optional(cx, name, self.def.exclude_glob.as_deref()),
            "source_files" => {
                let (kept, _) = self.matches(cx)?;
                Ok(Some(Value::List(
                    kept.iter()
                        .map(|p| Value::Str(p.to_string_lossy().into_owned()))
                        .collect(),
                )))
            }
            "exclude_count" => {
                let (_, excluded) = self.matches(cx)?;
                Ok(Some(Value::Int(excluded as i64)))
            }
            _ => Ok(None),
        }
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let dest_dir = cx.field_path("dest_dir")?;
        let (files, _) = self.matches(cx)?;
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            maker.ensure_symlink(&file, &dest_dir.join(name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_task, task};
    use super::*;
    use crate::runner::TaskState;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_up_to_date_on_second_run() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: layout\nensure-dir: { path: '{{project.name}}/var' }\n";

        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert_eq!(report.states(), vec![("layout", TaskState::Succeeded)]);
        assert!(temp_dir.path().join("app/var").is_dir());

        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert_eq!(report.states(), vec![("layout", TaskState::UpToDate)]);
    }

    #[test]
    fn test_ensure_file_renders_content() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = r#"
name: conf
ensure-file:
  path: etc/app.conf
  content: "name={{project.name}}\n"
"#;
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert!(report.is_success());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("etc/app.conf")).unwrap(),
            "name=app\n"
        );
        assert_eq!(report.descriptions(), vec!["Write etc/app.conf"]);
    }

    #[test]
    fn test_copy_dir_renders_templates_and_excludes() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("skel");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join("bin/start"), "#!/bin/sh\n").unwrap();
        fs::write(src.join("README.tmpl"), "Project {{project.name}}\n").unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();
        fs::write(src.join("notes.bak"), "old").unwrap();

        let yaml = r#"
name: skeleton
copy-dir:
  source: skel
  dest: out
  exclude: [".git", "*.bak"]
"#;
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert!(report.is_success(), "{:?}", report.error);

        let out = temp_dir.path().join("out");
        assert_eq!(fs::read_to_string(out.join("README")).unwrap(), "Project app\n");
        assert!(out.join("bin/start").is_file());
        assert!(!out.join(".git").exists());
        assert!(!out.join("notes.bak").exists());
        assert!(!out.join("README.tmpl").exists());
    }

    #[test]
    fn test_collect_files_walks_sorted_and_prunes_excluded_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("lib/deep")).unwrap();
        fs::create_dir_all(root.join("cache/nested")).unwrap();
        fs::write(root.join("zeta.txt"), "z").unwrap();
        fs::write(root.join("lib/deep/mod.py"), "").unwrap();
        fs::write(root.join("lib/a.py"), "").unwrap();
        fs::write(root.join("cache/nested/blob"), "").unwrap();

        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("cache").unwrap());
        let excludes = builder.build().unwrap();

        let files = collect_files(root, &excludes).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("lib/a.py"),
                PathBuf::from("lib/deep/mod.py"),
                PathBuf::from("zeta.txt"),
            ]
        );
    }

    #[test]
    fn test_copy_dir_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: skeleton\ncopy-dir: { source: nowhere, dest: out }\n";
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert!(!report.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_with_exclusions() {
        let temp_dir = TempDir::new().unwrap();
        let products = temp_dir.path().join("products");
        fs::create_dir_all(&products).unwrap();
        for name in ["alpha", "beta", "beta-old"] {
            fs::create_dir(products.join(name)).unwrap();
        }

        let yaml = r#"
name: link products
symlink:
  source_glob: "products/*"
  dest_dir: instance/Products
  exclude_glob: "*-old"
"#;
        let (report, _) = run_task(task(yaml), temp_dir.path(), false);
        assert!(report.is_success(), "{:?}", report.error);

        let dest = temp_dir.path().join("instance/Products");
        assert_eq!(fs::read_link(dest.join("alpha")).unwrap(), products.join("alpha"));
        assert!(dest.join("beta").exists());
        assert!(!dest.join("beta-old").exists());
        assert!(report.descriptions()[0].starts_with("Symlink 2 files matching"));
        assert!(report.descriptions()[0].ends_with("(1 excluded by *-old)"));
    }

    #[test]
    fn test_simulate_leaves_filesystem_alone() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = "name: conf\nensure-file: { path: a.txt, content: x }\n";
        let (report, log) = run_task(task(yaml), temp_dir.path(), true);
        assert_eq!(report.states(), vec![("conf", TaskState::Simulated)]);
        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(log.iter().any(|line| line.trim() == "Would run ensure-file task"));
    }
}
