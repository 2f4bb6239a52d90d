//! Ignore rules: defaults, the user's ignore file, synthesized directory
//! globs and negation.
//!
//! A path is kept when no exclude pattern matches it, or when any negate
//! pattern matches it. Negation always wins and the order of negate patterns
//! is irrelevant.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info};

use crate::discovery::collect_all_files;
use crate::error::{PackError, Result};
use crate::npm::{DependencyResolver, PackageManager};

/// Conventional ignore file looked up in the project root.
pub const IGNORE_FILE_NAME: &str = ".vscodeignore";

/// The manifest can never be ignored.
pub const MANIFEST_FILE_NAME: &str = "package.json";

pub const DEFAULT_IGNORE: &[&str] = &[
    ".vscodeignore",
    "package-lock.json",
    "yarn.lock",
    ".editorconfig",
    ".npmrc",
    ".yarnrc",
    ".gitattributes",
    "*.todo",
    "tslint.yaml",
    ".eslintrc*",
    ".babelrc*",
    ".prettierrc",
    "ISSUE_TEMPLATE.md",
    "CONTRIBUTING.md",
    "PULL_REQUEST_TEMPLATE.md",
    "CODE_OF_CONDUCT.md",
    ".github/**",
    ".travis.yml",
    "appveyor.yml",
    "**/.git/**",
    "**/*.vsix",
    "**/.DS_Store",
    "**/*.vsixmanifest",
    "**/.vscode-test/**",
];

/// Compiled exclude/negate pattern lists. Negate patterns are stored with
/// their `!` marker stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRuleSet {
    pub exclude: Vec<String>,
    pub negate: Vec<String>,
}

impl IgnoreRuleSet {
    /// Defaults, then user rules, then a `/**` glob for every user rule that
    /// does not already end in a wildcard segment, then the forced manifest
    /// inclusion.
    pub fn compile(user_rules: &[String]) -> Self {
        let synthesized = user_rules
            .iter()
            .filter(|rule| !last_segment(rule).contains('*'))
            .map(|rule| {
                if rule.ends_with('/') {
                    format!("{rule}**")
                } else {
                    format!("{rule}/**")
                }
            });

        let all: Vec<String> = DEFAULT_IGNORE
            .iter()
            .map(|s| s.to_string())
            .chain(user_rules.iter().cloned())
            .chain(synthesized)
            .chain(std::iter::once(format!("!{MANIFEST_FILE_NAME}")))
            .collect();

        let (negate, exclude): (Vec<String>, Vec<String>) = all
            .into_iter()
            .partition(|rule| rule.trim_start().starts_with('!'));
        let negate = negate
            .into_iter()
            .map(|rule| rule.trim_start()[1..].to_string())
            .collect();

        Self { exclude, negate }
    }

    /// Lines of an ignore file, trimmed, without blanks and comments.
    pub fn parse_lines(raw: &str) -> Vec<String> {
        raw.split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    pub fn matcher(&self) -> Result<IgnoreMatcher> {
        Ok(IgnoreMatcher {
            exclude: build_globset(&self.exclude)?,
            negate: build_globset(&self.negate)?,
        })
    }
}

fn last_segment(rule: &str) -> &str {
    rule.rsplit('/').next().unwrap_or(rule)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}

/// Shell-glob matcher with dotfile matching.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    exclude: GlobSet,
    negate: GlobSet,
}

impl IgnoreMatcher {
    pub fn is_included(&self, path: &str) -> bool {
        !self.exclude.is_match(path) || self.negate.is_match(path)
    }

    pub fn filter(&self, files: Vec<String>) -> Vec<String> {
        files.into_iter().filter(|f| self.is_included(f)).collect()
    }
}

/// User ignore rules. An explicitly named file must exist; the conventional
/// file in `cwd` is optional.
pub async fn read_ignore_rules(cwd: &Path, ignore_file: Option<&Path>) -> Result<Vec<String>> {
    let path = match ignore_file {
        Some(explicit) => explicit.to_path_buf(),
        None => cwd.join(IGNORE_FILE_NAME),
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            let rules = IgnoreRuleSet::parse_lines(&raw);
            debug!(path = %path.display(), rules = rules.len(), "Read ignore file");
            Ok(rules)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && ignore_file.is_none() => {
            debug!(path = %path.display(), "No ignore file, using defaults only");
            Ok(Vec::new())
        }
        Err(e) => Err(PackError::io(path, e)),
    }
}

/// Discovery followed by ignore filtering: the project-relative paths that
/// will be packaged.
pub async fn collect_files<R>(
    cwd: &Path,
    resolver: &R,
    package_manager: PackageManager,
    dependency_entry_points: Option<&[String]>,
    ignore_file: Option<&Path>,
) -> Result<Vec<String>>
where
    R: DependencyResolver + ?Sized,
{
    let files = collect_all_files(cwd, resolver, package_manager, dependency_entry_points).await?;
    let user_rules = read_ignore_rules(cwd, ignore_file).await?;
    let rules = IgnoreRuleSet::compile(&user_rules);
    let matcher = rules.matcher()?;

    let candidates = files.len();
    let kept = matcher.filter(files);
    info!(
        candidates,
        kept = kept.len(),
        exclude_rules = rules.exclude.len(),
        negate_rules = rules.negate.len(),
        "Applied ignore rules"
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(lines: &[&str]) -> IgnoreMatcher {
        let user: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        IgnoreRuleSet::compile(&user).matcher().unwrap()
    }

    #[test]
    fn comments_and_blank_lines_are_dropped() {
        let parsed = IgnoreRuleSet::parse_lines("# comment\n\n  src/**  \r\n!src/keep.ts\n");
        assert_eq!(parsed, vec!["src/**", "!src/keep.ts"]);
    }

    #[test]
    fn bare_directories_get_a_recursive_glob() {
        let compiled = IgnoreRuleSet::compile(&["out".to_string(), "docs/".to_string()]);
        assert!(compiled.exclude.contains(&"out/**".to_string()));
        assert!(compiled.exclude.contains(&"docs/**".to_string()));
        assert!(!compiled.exclude.contains(&"*.map/**".to_string()));
    }

    #[test]
    fn negations_are_split_and_stripped() {
        let compiled = IgnoreRuleSet::compile(&["!README.md".to_string()]);
        assert!(compiled.negate.contains(&"README.md".to_string()));
        assert!(compiled.negate.contains(&"README.md/**".to_string()));
        assert!(compiled.negate.contains(&MANIFEST_FILE_NAME.to_string()));
        assert!(compiled.exclude.iter().all(|r| !r.starts_with('!')));
    }

    #[test]
    fn defaults_exclude_lockfiles_and_vcs_metadata() {
        let m = rules(&[]);
        assert!(!m.is_included("package-lock.json"));
        assert!(!m.is_included(".git/config"));
        assert!(!m.is_included("node_modules/dep/.git/HEAD"));
        assert!(!m.is_included("old-1.0.0.vsix"));
        assert!(!m.is_included(".github/workflows/ci.yml"));
        assert!(m.is_included("src/.eslintrc.json"));
        assert!(m.is_included("extension.js"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let m = rules(&["*.ts"]);
        assert!(!m.is_included("main.ts"));
        assert!(m.is_included("src/main.ts"));
    }

    #[test]
    fn manifest_is_never_ignored() {
        let m = rules(&["*.json", "**"]);
        assert!(m.is_included("package.json"));
        assert!(!m.is_included("tsconfig.json"));
    }
}
