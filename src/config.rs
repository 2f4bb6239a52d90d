// vsix-pack/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::npm::PackageManager;

/// What to do when the manifest declares no source repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryPolicy {
    /// Ask on the terminal; behaves like `Fail` when stdin is not a terminal.
    #[default]
    Prompt,
    /// Warn and keep going.
    Continue,
    /// Abort the pack operation.
    Fail,
}

impl std::str::FromStr for RepositoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(RepositoryPolicy::Prompt),
            "continue" => Ok(RepositoryPolicy::Continue),
            "fail" => Ok(RepositoryPolicy::Fail),
            other => Err(format!(
                "unknown repository policy '{other}' (expected prompt, continue or fail)"
            )),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Options for a single pack or list operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Project directory; the process working directory when unset.
    pub cwd: Option<PathBuf>,
    /// Output file, or a directory that receives the default file name.
    pub package_path: Option<PathBuf>,
    pub package_manager: PackageManager,
    /// Restricts bundled dependencies to these names and their closure.
    pub dependency_entry_points: Option<Vec<String>>,
    /// Ignore file to use instead of `<cwd>/.vscodeignore`.
    pub ignore_file: Option<PathBuf>,
    pub base_content_url: Option<String>,
    pub base_images_url: Option<String>,
    pub github_branch: Option<String>,
    #[serde(default = "default_true")]
    pub expand_github_issue_links: bool,
    /// Enables web-resource classification for web-capable extensions.
    #[serde(default = "default_true")]
    pub web: bool,
    pub repository_policy: RepositoryPolicy,
    pub skip_prepublish: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            package_path: None,
            package_manager: PackageManager::default(),
            dependency_entry_points: None,
            ignore_file: None,
            base_content_url: None,
            base_images_url: None,
            github_branch: None,
            expand_github_issue_links: true,
            web: true,
            repository_policy: RepositoryPolicy::default(),
            skip_prepublish: false,
        }
    }
}

impl PackOptions {
    /// Options rooted at `cwd` with every other field defaulted.
    pub fn for_project(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    pub fn resolve_cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir(),
        }
    }

    pub fn ignore_file(&self) -> Option<&Path> {
        self.ignore_file.as_deref()
    }

    pub fn trace_loaded(&self) {
        info!(
            cwd = ?self.cwd,
            package_manager = ?self.package_manager,
            repository_policy = ?self.repository_policy,
            web = self.web,
            "Loaded pack options"
        );
        debug!(?self, "Pack options loaded (full debug)");
    }
}
