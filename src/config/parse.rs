//! Project file parsing and discovery

use crate::config::types::{ProjectDef, ProjectEntry, ProjectFile};
use crate::error::{ConfigError, ConfigResult, RassembleError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default project file names to search for
const PROJECT_FILE_NAMES: &[&str] = &["rassemble.yml", "rassemble.yaml"];

/// A fully loaded project file with includes expanded
#[derive(Debug, Clone)]
pub struct Projects {
    /// Projects in declaration order
    pub projects: Vec<ProjectDef>,

    /// File the projects were loaded from, if any
    pub path: Option<PathBuf>,
}

impl Projects {
    /// Look up a project by name
    pub fn get(&self, name: &str) -> Option<&ProjectDef> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Project names in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.projects.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Find the project file by searching current and parent directories
pub fn find_project_file() -> ConfigResult<PathBuf> {
    find_project_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the project file starting from a specific directory
pub fn find_project_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in PROJECT_FILE_NAMES {
            let path = current_dir.join(file_name);
            searched_paths.push(path.display().to_string());

            if path.is_file() {
                return Ok(path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a project file from a path
pub fn parse_project_file(path: &Path) -> Result<Projects, RassembleError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_projects(&contents, Some(path))
}

/// Parse projects from a string; includes are resolved relative to `path`
pub fn parse_projects(yaml: &str, path: Option<&Path>) -> Result<Projects, RassembleError> {
    let file: ProjectFile = serde_yaml::from_str(yaml)?;
    let base_dir = path
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut projects = Vec::with_capacity(file.projects.len());
    for entry in file.projects {
        match entry {
            ProjectEntry::Inline(project) => projects.push(project),
            ProjectEntry::Include { include } => {
                projects.push(load_included_project(&base_dir.join(include))?)
            }
        }
    }

    Ok(Projects {
        projects,
        path: path.map(Path::to_path_buf),
    })
}

/// Load a project from an included file
fn load_included_project(path: &Path) -> Result<ProjectDef, RassembleError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let project: ProjectDef =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::IncludeFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

    Ok(project)
}

/// Parse the project file with automatic discovery
pub fn parse_projects_auto() -> Result<Projects, RassembleError> {
    let path = find_project_file()?;
    parse_project_file(&path)
}
