//! External configuration and command-line overrides
//!
//! External configuration is a YAML file of sections. Each section maps keys
//! to scalar values:
//!
//! ```yaml
//! general:
//!   base_port: 8000
//!   admin_user: admin
//! app:
//!   port_offset: 3
//! ```
//!
//! Every section is visible to templates as `env.config.<section>`. A
//! section named after a project also supplies inherited values for that
//! project's settings.

use crate::config::types::scalar_to_string;
use crate::error::{ConfigError, ConfigResult, RassembleError};
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Sections of external configuration
pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// External configuration plus `--set` overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalConfig {
    /// Sections loaded from the settings file
    pub sections: Sections,

    /// `--set` overrides keyed by project (`None` applies to every project)
    overrides: BTreeMap<Option<String>, BTreeMap<String, String>>,

    /// Where the sections were loaded from
    pub path: Option<PathBuf>,
}

impl ExternalConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load sections from a YAML file
    pub fn load(path: &Path) -> Result<Self, RassembleError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("Failed to read settings {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&contents)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse sections from YAML text
    pub fn parse(yaml: &str) -> Result<Self, RassembleError> {
        let raw: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
            if yaml.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(yaml)?
            };

        let mut sections = Sections::new();
        for (section, entries) in raw {
            let mut values = BTreeMap::new();
            for (key, value) in entries {
                let value = scalar_to_string(&value).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "settings value {}.{} must be a scalar",
                        section, key
                    ))
                })?;
                values.insert(key, value);
            }
            sections.insert(section, values);
        }

        Ok(ExternalConfig {
            sections,
            overrides: BTreeMap::new(),
            path: None,
        })
    }

    /// Load from the user configuration directory, if a settings file exists there
    pub fn load_default() -> Result<Self, RassembleError> {
        match default_settings_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::new()),
        }
    }

    /// Apply a `[project.]name=value` override
    pub fn apply_override(&mut self, spec: &str) -> ConfigResult<()> {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidOverride(spec.to_string()))?;
        let key = key.trim();
        let (project, name) = match key.split_once('.') {
            Some((project, name)) => (Some(project.to_string()), name),
            None => (None, key),
        };
        if name.is_empty() || project.as_deref() == Some("") {
            return Err(ConfigError::InvalidOverride(spec.to_string()));
        }
        self.overrides
            .entry(project)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// The inherited value for a project setting, if any; overrides win over sections
    pub fn setting(&self, project: &str, name: &str) -> Option<&str> {
        self.overrides
            .get(&Some(project.to_string()))
            .and_then(|values| values.get(name))
            .or_else(|| self.overrides.get(&None).and_then(|values| values.get(name)))
            .or_else(|| self.sections.get(project).and_then(|values| values.get(name)))
            .map(String::as_str)
    }
}

/// `<config dir>/rassemble/settings.yml`
pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rassemble").map(|dirs| dirs.config_dir().join("settings.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SETTINGS: &str = r#"
general:
  base_port: 8000
  debug: false
app:
  port_offset: 3
"#;

    #[test]
    fn test_parse_sections() {
        let config = ExternalConfig::parse(SETTINGS).unwrap();
        assert_eq!(config.sections["general"]["base_port"], "8000");
        assert_eq!(config.sections["general"]["debug"], "False");
        assert_eq!(config.setting("app", "port_offset"), Some("3"));
        assert_eq!(config.setting("other", "port_offset"), None);
    }

    #[test]
    fn test_override_precedence() {
        let mut config = ExternalConfig::parse(SETTINGS).unwrap();
        config.apply_override("port_offset=5").unwrap();
        assert_eq!(config.setting("app", "port_offset"), Some("5"));

        config.apply_override("app.port_offset=7").unwrap();
        assert_eq!(config.setting("app", "port_offset"), Some("7"));
        assert_eq!(config.setting("other", "port_offset"), Some("5"));
    }

    #[test]
    fn test_override_value_may_contain_equals() {
        let mut config = ExternalConfig::new();
        config.apply_override("app.flags=a=b").unwrap();
        assert_eq!(config.setting("app", "flags"), Some("a=b"));
    }

    #[test]
    fn test_invalid_override() {
        let mut config = ExternalConfig::new();
        assert!(matches!(
            config.apply_override("no-equals"),
            Err(ConfigError::InvalidOverride(_))
        ));
        assert!(config.apply_override(".x=1").is_err());
    }

    #[test]
    fn test_non_scalar_rejected() {
        let result = ExternalConfig::parse("general:\n  ports: [1, 2]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_records_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.yml");
        fs::write(&path, SETTINGS).unwrap();

        let config = ExternalConfig::load(&path).unwrap();
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
    }
}
