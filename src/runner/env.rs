//! The `env` namespace: process and host state captured for one build

use crate::config::ExternalConfig;
use crate::error::{ConfigError, RassembleError};
use crate::template::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Host and process state visible to templates as `env.*`
#[derive(Debug, Clone)]
pub struct Environment {
    /// Root directory that relative task paths are resolved against
    pub base_path: PathBuf,

    /// Host name of the machine running the build
    pub hostname: String,

    /// Name of the user running the build
    pub user: String,

    /// Environment variables, including any loaded from an env file
    pub vars: BTreeMap<String, String>,

    /// External configuration sections and overrides
    pub config: ExternalConfig,

    /// Whether effects are being simulated
    pub simulate: bool,
}

impl Environment {
    /// Capture the current process environment, rooted at `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        let vars: BTreeMap<String, String> = env::vars().collect();
        let hostname = detect_hostname(&vars);
        let user = vars
            .get("USER")
            .or_else(|| vars.get("USERNAME"))
            .cloned()
            .unwrap_or_default();

        Environment {
            base_path,
            hostname,
            user,
            vars,
            config: ExternalConfig::new(),
            simulate: false,
        }
    }

    /// Set the external configuration
    pub fn with_config(mut self, config: ExternalConfig) -> Self {
        self.config = config;
        self
    }

    /// Set simulate mode
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Add variables from a dotenv-style file; the process environment is not modified
    pub fn with_env_file(mut self, path: &Path) -> Result<Self, RassembleError> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            ConfigError::Invalid(format!("Failed to read env file {}: {}", path.display(), e))
        })?;
        for item in iter {
            let (key, value) = item.map_err(|e| {
                ConfigError::Invalid(format!("Invalid env file {}: {}", path.display(), e))
            })?;
            self.vars.insert(key, value);
        }
        Ok(self)
    }

    /// Resolve a possibly relative path against `base_path`
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Look up `env.<name>`
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value = match name {
            "base_path" => Value::Str(self.base_path.to_string_lossy().into_owned()),
            "hostname" => Value::Str(self.hostname.clone()),
            "user" => Value::Str(self.user.clone()),
            "simulate" => Value::Bool(self.simulate),
            "vars" => Value::from(self.vars.clone()),
            "config" => Value::Map(
                self.config
                    .sections
                    .iter()
                    .map(|(section, values)| (section.clone(), Value::from(values.clone())))
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

fn detect_hostname(vars: &BTreeMap<String, String>) -> String {
    if let Some(name) = vars.get("HOSTNAME").filter(|n| !n.is_empty()) {
        return name.clone();
    }
    for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Ok(contents) = fs::read_to_string(path) {
            let name = contents.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    vars.get("COMPUTERNAME")
        .cloned()
        .unwrap_or_else(|| "localhost".to_string())
}
