//! Core configuration types
//!
//! This module defines the data structures that represent a rassemble.yml project file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level project file structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectFile {
    /// Projects in declaration order
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

/// A project, either inline or included from another file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged, try_from = "serde_yaml::Mapping")]
pub enum ProjectEntry {
    /// Include a project definition from another file
    Include { include: String },

    /// Inline project definition
    Inline(ProjectDef),
}

// Decided by key so that errors inside an inline project are reported as
// they are, not as a failure to match either shape.
impl TryFrom<serde_yaml::Mapping> for ProjectEntry {
    type Error = String;

    fn try_from(mapping: serde_yaml::Mapping) -> Result<Self, Self::Error> {
        match mapping.get("include") {
            Some(include) if mapping.len() == 1 => include
                .as_str()
                .map(|path| ProjectEntry::Include {
                    include: path.to_string(),
                })
                .ok_or_else(|| "include must be a file path".to_string()),
            Some(_) => Err("an include entry takes no other keys".to_string()),
            None => serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
                .map(ProjectEntry::Inline)
                .map_err(|e| e.to_string()),
        }
    }
}

/// A project definition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDef {
    /// Project name, used on the command line and in `project.name`
    pub name: String,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Projects this one builds on (ordering and documentation only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Settings schema
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<SettingDef>,

    /// Tasks in execution order
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

/// A setting declaration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SettingDef {
    pub name: String,

    /// Default value; a template or a list of templates
    #[serde(default)]
    pub default: SettingValue,

    /// Help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// A setting value as written in a project file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Single(#[serde(deserialize_with = "deserialize_scalar")] String),
    List(Vec<String>),
}

impl Default for SettingValue {
    fn default() -> Self {
        SettingValue::Single(String::new())
    }
}

/// A task descriptor
///
/// A task mapping holds `name`, `description`, `before` and `after` plus
/// exactly one kind key. Anything else is rejected rather than ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(try_from = "serde_yaml::Mapping")]
pub struct TaskDef {
    /// Task name, shown in progress output and failure messages
    pub name: String,

    /// Description template; each kind supplies a default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Commands to run before the action
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<Vec<String>>,

    /// Commands to run after the action
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<Vec<String>>,

    /// What the task does
    #[serde(flatten)]
    pub kind: TaskKind,
}

/// Field layout of a task mapping once its keys have been checked
#[derive(Deserialize)]
struct TaskFields {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    before: Vec<Vec<String>>,
    #[serde(default)]
    after: Vec<Vec<String>>,
    #[serde(flatten)]
    kind: TaskKind,
}

const TASK_FIELDS: &[&str] = &["name", "description", "before", "after"];

impl TryFrom<serde_yaml::Mapping> for TaskDef {
    type Error = String;

    fn try_from(mapping: serde_yaml::Mapping) -> Result<Self, Self::Error> {
        let label = match mapping.get("name").and_then(serde_yaml::Value::as_str) {
            Some(name) => format!("task '{}'", name),
            None => "task".to_string(),
        };

        let mut kinds = Vec::new();
        for key in mapping.keys() {
            let key = key
                .as_str()
                .ok_or_else(|| format!("{}: keys must be strings", label))?;
            if TaskKind::KEYS.contains(&key) {
                kinds.push(key);
            } else if !TASK_FIELDS.contains(&key) {
                return Err(format!("{}: unknown field '{}'", label, key));
            }
        }
        match kinds.as_slice() {
            [_] => {}
            [] => {
                return Err(format!(
                    "{}: missing a task kind (one of {})",
                    label,
                    TaskKind::KEYS.join(", ")
                ))
            }
            several => {
                return Err(format!(
                    "{}: more than one task kind ({})",
                    label,
                    several.join(", ")
                ))
            }
        }

        let fields: TaskFields = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| format!("{}: {}", label, e))?;
        Ok(TaskDef {
            name: fields.name,
            description: fields.description,
            before: fields.before,
            after: fields.after,
            kind: fields.kind,
        })
    }
}

/// Task kinds, keyed by their kebab-case name
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    EnsureDir(EnsureDirDef),
    EnsureFile(EnsureFileDef),
    CopyDir(CopyDirDef),
    Symlink(SymlinkDef),
    Script(ScriptDef),
    Checkout(CheckoutDef),
    InstallTarball(InstallTarballDef),
    RequireVersion(RequireVersionDef),
    WaitFor(WaitForDef),
    Confirm(ConfirmDef),
    Conditional(ConditionalDef),
    ForEach(ForEachDef),
}

impl TaskKind {
    /// Every kind key, in declaration order
    pub const KEYS: &'static [&'static str] = &[
        "ensure-dir",
        "ensure-file",
        "copy-dir",
        "symlink",
        "script",
        "checkout",
        "install-tarball",
        "require-version",
        "wait-for",
        "confirm",
        "conditional",
        "for-each",
    ];

    /// The key used for this kind in project files
    pub fn key(&self) -> &'static str {
        match self {
            TaskKind::EnsureDir(_) => "ensure-dir",
            TaskKind::EnsureFile(_) => "ensure-file",
            TaskKind::CopyDir(_) => "copy-dir",
            TaskKind::Symlink(_) => "symlink",
            TaskKind::Script(_) => "script",
            TaskKind::Checkout(_) => "checkout",
            TaskKind::InstallTarball(_) => "install-tarball",
            TaskKind::RequireVersion(_) => "require-version",
            TaskKind::WaitFor(_) => "wait-for",
            TaskKind::Confirm(_) => "confirm",
            TaskKind::Conditional(_) => "conditional",
            TaskKind::ForEach(_) => "for-each",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureDirDef {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureFileDef {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CopyDirDef {
    pub source: String,
    pub dest: String,
    /// Glob patterns, relative to `source`, that are not copied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SymlinkDef {
    pub source_glob: String,
    pub dest_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_glob: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptDef {
    /// Program and arguments; each element is a template
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutDef {
    pub repository: String,
    pub dest: String,
    /// Joined in front of `repository` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_repository: Option<String>,
    /// Initialize an empty repository when the remote cannot be cloned
    #[serde(default)]
    pub create_if_necessary: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstallTarballDef {
    pub url: String,
    /// Directory the archive is extracted into
    pub dest: String,
    pub version: String,
    /// Marker file holding the installed version; defaults to `{{task.dest}}/.rassemble-version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequireVersionDef {
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<String>,
    /// Exclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForDef {
    pub command: Vec<String>,
    /// Regex the command output must match to count as ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmDef {
    pub question: String,
    /// Answer used in simulate and non-interactive runs
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalDef {
    /// Tried in order; the first truthy condition wins
    pub when: Vec<ConditionalBranch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Box<TaskDef>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalBranch {
    /// Template rendered and read as a boolean
    #[serde(deserialize_with = "deserialize_scalar")]
    pub condition: String,
    pub task: Box<TaskDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForEachDef {
    /// Expression producing the items (a list, or a whitespace-separated string)
    pub over: String,
    /// Loop variable name
    #[serde(rename = "as")]
    pub var: String,
    pub task: Box<TaskDef>,
}

/// Accept YAML booleans and numbers where a template string is expected
pub(crate) fn deserialize_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| D::Error::custom("expected a string, number or boolean"))
}

/// String form of a YAML scalar, with booleans spelled the way templates print them
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
