//! Candidate file discovery across the project and its dependency roots.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{PackError, Result};
use crate::files::normalize;
use crate::npm::{DependencyResolver, PackageManager};

/// Every file under the project root and each production dependency root,
/// relative to `cwd` with forward slashes. The result is sorted and free of
/// duplicates, so it does not depend on traversal order.
pub async fn collect_all_files<R>(
    cwd: &Path,
    resolver: &R,
    package_manager: PackageManager,
    dependency_entry_points: Option<&[String]>,
) -> Result<Vec<String>>
where
    R: DependencyResolver + ?Sized,
{
    let roots = resolver
        .resolve(
            cwd.to_path_buf(),
            package_manager,
            dependency_entry_points.map(<[String]>::to_vec),
        )
        .await?;
    debug!(roots = ?roots, "Walking dependency roots");

    let walks = roots.into_iter().map(|root| {
        let cwd = cwd.to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || walk_root(&cwd, &root))
                .await
                .map_err(|e| PackError::Task(e.to_string()))?
        }
    });
    let per_root = try_join_all(walks).await?;

    let files: BTreeSet<String> = per_root
        .into_iter()
        .flatten()
        .filter(|f| !f.contains('\r'))
        .collect();
    info!(cwd = %cwd.display(), files = files.len(), "Collected candidate files");
    Ok(files.into_iter().collect())
}

/// All regular files below `root`, skipping the root's own `node_modules`.
fn walk_root(cwd: &Path, root: &Path) -> Result<Vec<String>> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1 && e.file_type().is_dir() && e.file_name() == "node_modules")
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => match e.loop_ancestor() {
                Some(ancestor) => {
                    warn!(
                        path = ?e.path(),
                        ancestor = %ancestor.display(),
                        "Skipping symlink loop"
                    );
                    continue;
                }
                None => return Err(e.into()),
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = relative_to(cwd, entry.path());
        files.push(normalize(&relative.to_string_lossy()));
    }
    Ok(files)
}

/// `path` expressed relative to `base`, climbing with `..` when needed.
fn relative_to(base: &Path, path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix(base) {
        return stripped.to_path_buf();
    }

    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = path.components().collect();
    let shared = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base.len() {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component.as_os_str());
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_climb_out_of_the_base() {
        assert_eq!(
            relative_to(Path::new("/a/b"), Path::new("/a/b/c/d.txt")),
            PathBuf::from("c/d.txt")
        );
        assert_eq!(
            relative_to(Path::new("/a/b"), Path::new("/a/x/y.txt")),
            PathBuf::from("../x/y.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loops_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("out")).unwrap();
        std::fs::write(root.join("out/extension.js"), b"x").unwrap();
        std::os::unix::fs::symlink(root, root.join("out/again")).unwrap();

        let files = walk_root(root, root).unwrap();
        assert_eq!(files, vec!["out/extension.js".to_string()]);
    }
}
