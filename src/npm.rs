//! Package-manager collaborators: production dependency roots and the
//! latest-version query.
//!
//! Both shell out to `npm`/`yarn`. Every invocation can be cancelled through a
//! [`CancellationToken`]; cancelling kills the child process and resolves the
//! pending call with [`NpmError::Cancelled`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

static VERSIONED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(@?[^@]+)@.*$").expect("versioned name regex is valid"));

static RANGED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\^~]").expect("ranged name regex is valid"));

static YARN_TREE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\{"type":"tree".*$"#).expect("yarn tree regex is valid"));

#[derive(Debug, Error)]
pub enum NpmError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("npm@{version} doesn't work with vsix-pack. Please update npm: npm install -g npm")]
    IncompatibleNpm { version: String },

    #[error("Could not parse result of `{command}`")]
    Parse { command: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Dependency seen more than once: {0}")]
    DuplicateDependency(String),

    #[error("Could not find dependency: {0}")]
    MissingDependency(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Which package manager resolves production dependencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    /// Package only the project directory itself.
    None,
}

impl PackageManager {
    pub fn tool(self) -> &'static str {
        match self {
            PackageManager::Yarn => "yarn",
            PackageManager::Npm | PackageManager::None => "npm",
        }
    }
}

/// Cooperative cancellation handle shared between a caller and a running
/// package-manager invocation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the directories whose contents belong in the package.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Returns the project root followed by every production dependency
    /// directory. A project without a lockfile yields just the root.
    async fn resolve(
        &self,
        cwd: PathBuf,
        package_manager: PackageManager,
        entry_points: Option<Vec<String>>,
    ) -> Result<Vec<PathBuf>, NpmError>;
}

/// Resolver backed by the real `npm`/`yarn` executables.
#[derive(Debug, Clone, Default)]
pub struct PackageManagerResolver {
    cancellation: Option<CancellationToken>,
}

impl PackageManagerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[async_trait]
impl DependencyResolver for PackageManagerResolver {
    async fn resolve(
        &self,
        cwd: PathBuf,
        package_manager: PackageManager,
        entry_points: Option<Vec<String>>,
    ) -> Result<Vec<PathBuf>, NpmError> {
        get_dependencies(
            &cwd,
            package_manager,
            entry_points.as_deref(),
            self.cancellation.as_ref(),
        )
        .await
    }
}

pub(crate) fn program(tool: &str) -> String {
    if cfg!(windows) {
        format!("{tool}.cmd")
    } else {
        tool.to_string()
    }
}

/// Runs a command to completion and returns its stdout, or bails out as soon
/// as `cancellation` fires.
async fn exec(
    mut command: Command,
    cancellation: Option<&CancellationToken>,
) -> Result<String, NpmError> {
    let command_line = format!("{:?}", command.as_std());
    if cancellation.is_some_and(CancellationToken::is_cancelled) {
        return Err(NpmError::Cancelled);
    }

    command
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = command.spawn().map_err(|source| NpmError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    let waited = match cancellation {
        Some(token) => tokio::select! {
            output = child.wait_with_output() => output,
            _ = token.cancelled() => {
                debug!(command = %command_line, "Package manager invocation cancelled");
                return Err(NpmError::Cancelled);
            }
        },
        None => child.wait_with_output().await,
    };
    let output = waited.map_err(|source| NpmError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(NpmError::CommandFailed {
            command: command_line,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn check_npm(cancellation: Option<&CancellationToken>) -> Result<(), NpmError> {
    let mut command = Command::new(program("npm"));
    command.arg("-v");
    let stdout = exec(command, cancellation).await?;
    let version = stdout.trim();
    if is_broken_npm_version(version) {
        return Err(NpmError::IncompatibleNpm {
            version: version.to_string(),
        });
    }
    Ok(())
}

fn is_broken_npm_version(version: &str) -> bool {
    matches!(
        version.strip_prefix("3.7."),
        Some("0") | Some("1") | Some("2") | Some("3")
    )
}

fn first_line(stdout: &str) -> Option<String> {
    stdout
        .split(['\r', '\n'])
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Latest published version of `name` according to the npm registry.
pub async fn get_latest_version(
    name: &str,
    cancellation: Option<&CancellationToken>,
) -> Result<String, NpmError> {
    check_npm(cancellation).await?;
    let mut command = Command::new(program("npm"));
    command.args(["show", name, "version"]);
    let stdout = exec(command, cancellation).await?;
    first_line(&stdout).ok_or_else(|| NpmError::Parse {
        command: format!("npm show {name} version"),
    })
}

/// Project root plus production dependency directories, deduplicated.
pub async fn get_dependencies(
    cwd: &Path,
    package_manager: PackageManager,
    packaged_dependencies: Option<&[String]>,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<PathBuf>, NpmError> {
    let roots = match package_manager {
        PackageManager::None => vec![cwd.to_path_buf()],
        PackageManager::Npm => get_npm_dependencies(cwd, cancellation).await?,
        PackageManager::Yarn => {
            get_yarn_dependencies(cwd, packaged_dependencies, cancellation).await?
        }
    };
    info!(
        package_manager = ?package_manager,
        roots = roots.len(),
        "Resolved dependency roots"
    );
    Ok(roots)
}

async fn get_npm_dependencies(
    cwd: &Path,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<PathBuf>, NpmError> {
    if !cwd.join("package-lock.json").exists() && !cwd.join("node_modules").is_dir() {
        debug!(cwd = %cwd.display(), "No npm lockfile or node_modules, skipping dependency resolution");
        return Ok(vec![cwd.to_path_buf()]);
    }

    let mut command = Command::new(program("npm"));
    command
        .args([
            "list",
            "--production",
            "--parseable",
            "--depth=99999",
            "--loglevel=error",
        ])
        .current_dir(cwd);
    let stdout = exec(command, cancellation).await?;

    let mut roots = vec![cwd.to_path_buf()];
    roots.extend(
        stdout
            .split(['\r', '\n'])
            .map(PathBuf::from)
            .filter(|dir| dir.is_absolute()),
    );
    Ok(dedupe(roots))
}

/// Node of `yarn list --json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct YarnTreeNode {
    pub name: String,
    #[serde(default)]
    pub children: Vec<YarnTreeNode>,
}

#[derive(Debug, Deserialize)]
struct YarnListOutput {
    data: YarnListData,
}

#[derive(Debug, Deserialize)]
struct YarnListData {
    trees: Vec<YarnTreeNode>,
}

/// A resolved dependency: bare package name, install directory, children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YarnDependency {
    pub name: String,
    pub path: PathBuf,
    pub children: Vec<YarnDependency>,
}

/// Strips the `@version` suffix, keeping a leading scope marker.
fn bare_package_name(name: &str) -> String {
    VERSIONED_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map_or_else(|| name.to_string(), |m| m.as_str().to_string())
}

pub fn as_yarn_dependency(prefix: &Path, tree: &YarnTreeNode, prune: bool) -> Option<YarnDependency> {
    if prune && RANGED_NAME_RE.is_match(&tree.name) {
        return None;
    }

    let name = bare_package_name(&tree.name);
    let path = prefix.join(&name);
    let child_prefix = path.join("node_modules");
    let children = tree
        .children
        .iter()
        .filter_map(|child| as_yarn_dependency(&child_prefix, child, prune))
        .collect();

    Some(YarnDependency {
        name,
        path,
        children,
    })
}

/// Transitive closure of `packaged` over the top-level dependency list.
pub fn select_yarn_dependencies(
    deps: &[YarnDependency],
    packaged: &[String],
) -> Result<Vec<YarnDependency>, NpmError> {
    let mut index: HashMap<&str, &YarnDependency> = HashMap::new();
    for dep in deps {
        if index.insert(dep.name.as_str(), dep).is_some() {
            return Err(NpmError::DuplicateDependency(dep.name.clone()));
        }
    }

    let mut reached: Vec<YarnDependency> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = packaged.iter().rev().cloned().collect();
    while let Some(name) = stack.pop() {
        let dep = index
            .get(name.as_str())
            .ok_or_else(|| NpmError::MissingDependency(name.clone()))?;
        if !seen.insert(dep.name.clone()) {
            continue;
        }
        reached.push((*dep).clone());
        stack.extend(dep.children.iter().rev().map(|c| c.name.clone()));
    }
    Ok(reached)
}

fn parse_yarn_trees(raw: &str) -> Result<Vec<YarnTreeNode>, NpmError> {
    let line = YARN_TREE_LINE_RE.find(raw).ok_or_else(|| NpmError::Parse {
        command: "yarn list --json".to_string(),
    })?;
    let parsed: YarnListOutput = serde_json::from_str(line.as_str())?;
    Ok(parsed.data.trees)
}

async fn get_yarn_production_dependencies(
    cwd: &Path,
    packaged_dependencies: Option<&[String]>,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<YarnDependency>, NpmError> {
    let mut command = Command::new(program("yarn"));
    command.args(["list", "--prod", "--json"]).current_dir(cwd);
    let raw = exec(command, cancellation).await?;

    let trees = parse_yarn_trees(&raw)?;
    let prefix = cwd.join("node_modules");
    let deps: Vec<YarnDependency> = trees
        .iter()
        .filter_map(|tree| as_yarn_dependency(&prefix, tree, packaged_dependencies.is_none()))
        .collect();

    match packaged_dependencies {
        Some(packaged) => select_yarn_dependencies(&deps, packaged),
        None => Ok(deps),
    }
}

async fn get_yarn_dependencies(
    cwd: &Path,
    packaged_dependencies: Option<&[String]>,
    cancellation: Option<&CancellationToken>,
) -> Result<Vec<PathBuf>, NpmError> {
    let mut roots = vec![cwd.to_path_buf()];
    if !cwd.join("yarn.lock").exists() {
        return Ok(roots);
    }

    let deps = get_yarn_production_dependencies(cwd, packaged_dependencies, cancellation).await?;
    fn flatten(dep: &YarnDependency, out: &mut Vec<PathBuf>) {
        out.push(dep.path.clone());
        for child in &dep.children {
            flatten(child, out);
        }
    }
    for dep in &deps {
        flatten(dep, &mut roots);
    }
    Ok(dedupe(roots))
}

fn dedupe(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
