//! Error types for Rassemble

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Rassemble operations
pub type Result<T> = std::result::Result<T, RassembleError>;

/// Main error type for Rassemble
#[derive(Error, Debug)]
pub enum RassembleError {
    /// Project file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template resolution errors
    #[error("Configuration error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// Side-effect failures
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Toolchain or dependency preconditions
    #[error("Version incompatibility: {0}")]
    Version(#[from] VersionError),

    /// A task in a project sequence failed; the rest of the sequence was skipped
    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<RassembleError>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RassembleError {
    /// The innermost error, looking through `TaskFailed` wrappers
    pub fn root(&self) -> &RassembleError {
        match self {
            RassembleError::TaskFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Project file parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find project file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Project '{0}' is defined more than once")]
    DuplicateProject(String),

    #[error("Setting '{setting}' is declared more than once in project '{project}'")]
    DuplicateSetting { project: String, setting: String },

    #[error("Project '{0}' is not defined")]
    ProjectNotFound(String),

    #[error("Project '{project}' requires unknown project '{required}'")]
    UnknownRequirement { project: String, required: String },

    #[error("Circular project requirement detected: {0}")]
    CircularRequirement(String),

    #[error("Invalid override '{0}' (expected [project.]name=value)")]
    InvalidOverride(String),

    #[error("Failed to include file '{path}': {error}")]
    IncludeFile { path: PathBuf, error: String },
}

/// Template interpolation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("invalid template syntax at offset {offset}: {message}")]
    InvalidSyntax { offset: usize, message: String },

    #[error("{0}")]
    Evaluation(String),

    #[error("recursive interpolation of '{0}'")]
    Recursive(String),

    #[error("in {field} ({template:?}): {source}")]
    InField {
        field: String,
        template: String,
        #[source]
        source: Box<InterpolationError>,
    },
}

impl InterpolationError {
    /// Attach the originating field and template source, unless already attached
    pub fn in_field(self, field: &str, template: &str) -> Self {
        match self {
            already @ InterpolationError::InField { .. } => already,
            other => InterpolationError::InField {
                field: field.to_string(),
                template: template.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error without field context
    pub fn kind(&self) -> &InterpolationError {
        match self {
            InterpolationError::InField { source, .. } => source.kind(),
            other => other,
        }
    }
}

/// Side-effect execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command `{command}` failed with exit code {code:?}{}", format_output(.output))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Failed to start `{command}`: {error}")]
    Spawn { command: String, error: String },

    #[error("Download of {url} failed: {error}")]
    Download { url: String, error: String },

    #[error("{path} exists with different content (set overwrite to replace it)")]
    FileConflict { path: PathBuf },

    #[error("{path} exists and is not a symlink")]
    NotASymlink { path: PathBuf },

    #[error("Declined: {0}")]
    Declined(String),

    #[error("Invalid task input '{name}': {error}")]
    InvalidInput { name: String, error: String },
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

/// Version precondition errors
#[derive(Error, Debug)]
pub enum VersionError {
    #[error("{tool} version {found} does not satisfy {requirement}")]
    Incompatible {
        tool: String,
        found: String,
        requirement: String,
    },

    #[error("Could not find a version number in the output of {tool}: {output:?}")]
    Unparseable { tool: String, output: String },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;
