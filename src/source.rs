//! List file acquisition: optional repository sync and directory discovery.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[cfg(test)]
use mockall::automock;

use crate::config::GeneralConfig;

/// Output of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// Runs external programs; mocked in tests so no `git` binary is needed.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Replace `dir` with a shallow clone of `repository`.
pub fn sync_repository(
    executor: &dyn CommandExecutor,
    repository: &str,
    dir: &Path,
) -> Result<()> {
    if dir.exists() {
        debug!("Removing previous checkout {}", dir.display());
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
    }

    info!("Cloning {} into {}", repository, dir.display());
    let args = vec![
        "clone".to_string(),
        "--depth".to_string(),
        "1".to_string(),
        repository.to_string(),
        dir.to_string_lossy().to_string(),
    ];
    let output = executor.execute("git", &args)?;
    if !output.success {
        bail!(
            "git clone exited with {}: {}",
            output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            output.stderr.trim()
        );
    }
    Ok(())
}

/// Include/exclude filter over names. Exclusion wins; an empty include set admits everything.
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl SelectionFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        if self.exclude.contains(name) {
            return false;
        }
        self.include.is_empty() || self.include.contains(name)
    }
}

/// Set name of a list file: its file stem.
pub fn set_name(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// List files under `root` with one of `extensions` whose set name passes `sets`, sorted by path.
pub fn discover(root: &Path, extensions: &[String], sets: &SelectionFilter) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let matches_extension = path
            .extension()
            .map(|ext| extensions.iter().any(|e| ext == e.as_str()))
            .unwrap_or(false);
        if !matches_extension {
            continue;
        }

        match set_name(path) {
            Some(name) if sets.allows(&name) => files.push(path.to_path_buf()),
            _ => debug!("Filtered out {}", path.display()),
        }
    }

    files.sort();
    Ok(files)
}

/// Read a list file; invalid UTF-8 is replaced rather than rejected.
pub fn read_list(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Sync the repository when configured, then discover list files.
pub fn acquire(general: &GeneralConfig, executor: &dyn CommandExecutor) -> Result<Vec<PathBuf>> {
    if general.clone_repository {
        if let Err(e) = sync_repository(executor, &general.repository, &general.source_dir) {
            warn!("Repository sync failed, using files on disk: {:#}", e);
        }
    }

    let sets = SelectionFilter::new(
        general.include_sets.iter().cloned(),
        general.exclude_sets.iter().cloned(),
    );
    let files = discover(&general.source_dir, &general.extensions, &sets)?;
    info!(
        "Found {} list files in {}",
        files.len(),
        general.source_dir.display()
    );
    Ok(files)
}
