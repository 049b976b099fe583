//! Download and unpack a versioned archive

use super::text;
use crate::config::InstallTarballDef;
use crate::error::{InterpolationResult, Result};
use crate::runner::{Maker, Resolver, Task, TaskMeta};
use crate::template::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const DEFAULT_VERSION_FILE: &str = "{{task.dest}}/.rassemble-version";

/// Install an archive into a directory, recording the installed version
///
/// The archive is downloaded to a temporary file that is removed however the
/// installation ends.
#[derive(Debug)]
pub struct InstallTarball {
    meta: TaskMeta,
    def: InstallTarballDef,
}

impl InstallTarball {
    pub fn new(meta: TaskMeta, def: InstallTarballDef) -> Self {
        InstallTarball { meta, def }
    }

    fn installed_version(&self, cx: &Resolver<'_>) -> InterpolationResult<Option<String>> {
        let path = cx.field_path("version_file")?;
        Ok(fs::read_to_string(path)
            .ok()
            .map(|contents| contents.trim().to_string()))
    }
}

fn archive_suffix(url: &str) -> &'static str {
    [".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".tar"]
        .into_iter()
        .find(|suffix| url.ends_with(suffix))
        .unwrap_or("")
}

impl Task for InstallTarball {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn kind(&self) -> &'static str {
        "install-tarball"
    }

    fn default_description(&self) -> &'static str {
        "Install {{task.url}} (version {{task.version}}) into {{task.dest}}"
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["url", "dest", "version", "version_file"]
    }

    fn attribute(&self, name: &str, cx: &Resolver<'_>) -> InterpolationResult<Option<Value>> {
        match name {
            "url" => text(cx, name, &self.def.url),
            "dest" => text(cx, name, &self.def.dest),
            "version" => text(cx, name, &self.def.version),
            "version_file" => text(
                cx,
                name,
                self.def.version_file.as_deref().unwrap_or(DEFAULT_VERSION_FILE),
            ),
            _ => Ok(None),
        }
    }

    fn is_up_to_date(&self, cx: &Resolver<'_>, _maker: &mut Maker) -> Result<bool> {
        let wanted = cx.field_str("version")?;
        Ok(self.installed_version(cx)?.as_deref() == Some(wanted.as_str()))
    }

    fn run(&self, cx: &Resolver<'_>, maker: &mut Maker) -> Result<()> {
        let url = cx.field_str("url")?;
        let dest = cx.field_path("dest")?;
        let version = cx.field_str("version")?;
        let version_file = cx.field_path("version_file")?;

        // Ask before replacing another version
        if let Some(installed) = self.installed_version(cx)? {
            let question = format!(
                "{} has version {} installed. Replace it with version {}?",
                dest.display(),
                installed,
                version
            );
            if !maker.ask(&question, true)? {
                maker
                    .logger()
                    .notify(&format!("Keeping installed version {}", installed));
                return Ok(());
            }
        }

        // Download into a scoped temp file and unpack
        maker.ensure_dir(&dest)?;
        let archive = maker.temp_file(archive_suffix(&url))?;
        maker.download(&source(cx, &url), archive.path())?;
        extract(maker, archive.path(), &dest)?;

        // Record the installed version
        maker.ensure_file(&version_file, &format!("{}\n", version), false, true)?;
        Ok(())
    }
}

/// Plain paths are relative to the base path; URLs pass through
fn source(cx: &Resolver<'_>, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        cx.env().resolve_path(url).to_string_lossy().into_owned()
    }
}

fn extract(maker: &mut Maker, archive: &Path, dest: &Path) -> Result<()> {
    let argv = vec![
        "tar".to_string(),
        "-xf".to_string(),
        archive.to_string_lossy().into_owned(),
        "-C".to_string(),
        dest.to_string_lossy().into_owned(),
    ];
    maker.run_command(&argv, None, &BTreeMap::new())?;
    Ok(())
}
