//! Side effects, with simulate mode honored in one place
//!
//! Tasks never touch the filesystem or spawn processes directly. They ask the
//! [`Maker`], which performs the effect, or in simulate mode logs what it
//! would have done. The `ensure_*` operations do nothing when the desired
//! state already holds and return whether anything changed.

use crate::error::{ExecutionError, Result};
use crate::runner::prompt::{Prompter, TerminalPrompter};
use crate::runner::{TaskOutcome, TaskState};
use crate::ui::{Logger, Verbosity};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Performs (or simulates) every side effect of a build
pub struct Maker {
    logger: Logger,
    simulate: bool,
    interactive: bool,
    prompter: Box<dyn Prompter>,
    temp_dir: Option<PathBuf>,
    journal: Vec<TaskOutcome>,
}

impl Maker {
    /// Create a maker; questions are only asked when attached to a terminal
    pub fn new(logger: Logger) -> Self {
        Maker {
            logger,
            simulate: false,
            interactive: io::stdin().is_terminal() && io::stderr().is_terminal(),
            prompter: Box::new(TerminalPrompter),
            temp_dir: None,
            journal: Vec::new(),
        }
    }

    /// Set simulate mode
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Set whether questions are put to the prompter
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Replace the source of answers; also makes the maker interactive
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self.interactive = true;
        self
    }

    /// Directory for temporary downloads (the system default otherwise)
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }

    pub fn is_simulate(&self) -> bool {
        self.simulate
    }

    pub fn logger(&mut self) -> &mut Logger {
        &mut self.logger
    }

    /// Read-only view of the logger
    pub fn log(&self) -> &Logger {
        &self.logger
    }

    /// Record a task in the journal, returning its position
    pub fn record(&mut self, outcome: TaskOutcome) -> usize {
        self.journal.push(outcome);
        self.journal.len() - 1
    }

    /// Move a recorded task to a new state
    pub fn set_state(&mut self, index: usize, state: TaskState) {
        if let Some(outcome) = self.journal.get_mut(index) {
            outcome.state = state;
        }
    }

    /// Outcomes recorded since the last call
    pub fn take_journal(&mut self) -> Vec<TaskOutcome> {
        std::mem::take(&mut self.journal)
    }

    /// Ensure a directory exists, creating parents as needed
    pub fn ensure_dir(&mut self, path: &Path) -> Result<bool> {
        if path.is_dir() {
            trace!(path = %path.display(), "directory exists");
            return Ok(false);
        }
        if self.simulate {
            self.logger.would(&format!("create directory {}", path.display()));
            return Ok(true);
        }

        debug!(path = %path.display(), "creating directory");
        self.logger.debug(&format!("Creating directory {}", path.display()));
        fs::create_dir_all(path)?;
        Ok(true)
    }

    /// Whether `path` holds exactly `content` (and is executable, when asked)
    pub fn file_matches(&self, path: &Path, content: &str, executable: bool) -> bool {
        match fs::read(path) {
            Ok(existing) => existing == content.as_bytes() && (!executable || is_executable(path)),
            Err(_) => false,
        }
    }

    /// Ensure a file has the given content
    ///
    /// A file with different content is only replaced when `overwrite` is
    /// set; otherwise this fails with [`ExecutionError::FileConflict`].
    pub fn ensure_file(
        &mut self,
        path: &Path,
        content: &str,
        executable: bool,
        overwrite: bool,
    ) -> Result<bool> {
        let existing = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let same_content = existing.as_deref() == Some(content.as_bytes());
        if existing.is_some() && !same_content && !overwrite {
            return Err(ExecutionError::FileConflict {
                path: path.to_path_buf(),
            }
            .into());
        }

        let needs_mode = executable && !(same_content && is_executable(path));
        if same_content && !needs_mode {
            return Ok(false);
        }

        if self.simulate {
            if same_content {
                self.logger.would(&format!("make {} executable", path.display()));
            } else {
                self.logger.would(&format!("write {}", path.display()));
            }
            return Ok(true);
        }

        if !same_content {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!(path = %path.display(), bytes = content.len(), "writing file");
            self.logger.debug(&format!("Writing {}", path.display()));
            fs::write(path, content)?;
        }
        if executable {
            set_executable(path)?;
        }
        Ok(true)
    }

    /// Copy a file unless the destination already has identical content
    pub fn copy_file(&mut self, source: &Path, dest: &Path) -> Result<bool> {
        if let (Ok(a), Ok(b)) = (fs::read(source), fs::read(dest)) {
            if a == b {
                trace!(dest = %dest.display(), "identical file, skipping");
                return Ok(false);
            }
        }
        if self.simulate {
            self.logger
                .would(&format!("copy {} to {}", source.display(), dest.display()));
            return Ok(true);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(source = %source.display(), dest = %dest.display(), "copying file");
        fs::copy(source, dest)?;
        Ok(true)
    }

    /// Ensure `link` is a symlink pointing at `target`
    ///
    /// An existing symlink pointing elsewhere is replaced. Anything else
    /// already at `link` is an error.
    pub fn ensure_symlink(&mut self, target: &Path, link: &Path) -> Result<bool> {
        match fs::symlink_metadata(link) {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(link)? == target {
                    return Ok(false);
                }
                if self.simulate {
                    self.logger.would(&format!(
                        "repoint {} to {}",
                        link.display(),
                        target.display()
                    ));
                    return Ok(true);
                }
                fs::remove_file(link)?;
            }
            Ok(_) => {
                return Err(ExecutionError::NotASymlink {
                    path: link.to_path_buf(),
                }
                .into())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.simulate {
                    self.logger
                        .would(&format!("link {} to {}", link.display(), target.display()));
                    return Ok(true);
                }
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(link = %link.display(), target = %target.display(), "creating symlink");
        make_symlink(target, link)?;
        Ok(true)
    }

    /// Run a command to completion, returning its combined output
    ///
    /// A non-zero exit fails with [`ExecutionError::CommandFailed`], carrying
    /// the captured output.
    pub fn run_command(
        &mut self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let display = display_command(argv);
        if self.simulate {
            self.logger.would(&format!("run {}", display));
            return Ok(String::new());
        }

        self.logger.notify(&format!("$ {}", display));
        let (success, code, output) = capture(argv, cwd, env)?;

        // Check exit status
        if !success {
            return Err(ExecutionError::CommandFailed {
                command: display,
                code,
                output,
            }
            .into());
        }
        for line in output.lines() {
            self.logger.debug(line);
        }
        Ok(output)
    }

    /// Run a read-only check; returns whether it succeeded and its output
    ///
    /// Checks run in simulate mode too. A command that cannot be started
    /// counts as a failure rather than an error.
    pub fn check_output(&mut self, argv: &[String], cwd: Option<&Path>) -> (bool, String) {
        match capture(argv, cwd, &BTreeMap::new()) {
            Ok((success, _, output)) => (success, output),
            Err(e) => {
                debug!(command = %display_command(argv), error = %e, "check could not start");
                (false, String::new())
            }
        }
    }

    /// Whether a check command exits successfully
    pub fn command_succeeds(&mut self, argv: &[String], cwd: Option<&Path>) -> bool {
        self.check_output(argv, cwd).0
    }

    /// A scoped temporary file; it is removed when dropped
    pub fn temp_file(&self, suffix: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rassemble-").suffix(suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }

    /// Fetch `url` into `dest`
    ///
    /// `file://` URLs and plain paths are copied; anything else is fetched
    /// over HTTP(S).
    pub fn download(&mut self, url: &str, dest: &Path) -> Result<()> {
        if self.simulate {
            self.logger.would(&format!("download {}", url));
            return Ok(());
        }

        self.logger.notify(&format!("Downloading {}", url));
        let download_error = |error: String| ExecutionError::Download {
            url: url.to_string(),
            error,
        };

        // Local archives are copied
        if let Some(local) = local_source(url) {
            debug!(source = %local.display(), dest = %dest.display(), "copying local archive");
            fs::copy(&local, dest).map_err(|e| download_error(e.to_string()))?;
            return Ok(());
        }

        debug!(url, dest = %dest.display(), "fetching");
        let mut response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_error(e.to_string()))?;
        let mut file = fs::File::create(dest)?;
        response
            .copy_to(&mut file)
            .map_err(|e| download_error(e.to_string()))?;
        Ok(())
    }

    /// Ask a yes/no question
    ///
    /// In simulate or non-interactive mode the default is returned without
    /// asking.
    pub fn ask(&mut self, question: &str, default: bool) -> Result<bool> {
        if self.simulate || !self.interactive {
            let answer = if default { "yes" } else { "no" };
            self.logger.debug(&format!("{} (answering {})", question, answer));
            return Ok(default);
        }
        Ok(self.prompter.prompt(question, default)?.unwrap_or(default))
    }
}

impl Default for Maker {
    fn default() -> Self {
        Maker::new(Logger::new(Verbosity::Normal))
    }
}

fn capture(
    argv: &[String],
    cwd: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Result<(bool, Option<i32>, String)> {
    let command_line = display_command(argv);
    let (program, args) = argv.split_first().ok_or_else(|| ExecutionError::InvalidInput {
        name: "command".to_string(),
        error: "command is empty".to_string(),
    })?;

    // Build the command
    let mut command = Command::new(program);
    command.args(args);

    // Set working directory
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command.envs(env);
    command.stdin(Stdio::null());

    // Execute and collect both streams
    trace!(command = %command_line, "spawning");
    let output = command.output().map_err(|e| ExecutionError::Spawn {
        command: command_line.clone(),
        error: e.to_string(),
    })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    debug!(command = %command_line, status = ?output.status.code(), "command finished");
    Ok((output.status.success(), output.status.code(), text))
}

/// Shell-like rendering of an argv for messages
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn local_source(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
