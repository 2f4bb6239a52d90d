//! Top-level pack and list operations.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::archive::write_vsix;
use crate::config::PackOptions;
use crate::error::{PackError, Result};
use crate::files::PackFile;
use crate::ignore::collect_files;
use crate::manifest::{read_manifest, Manifest};
use crate::npm::{program, DependencyResolver, PackageManager};
use crate::processors::{create_default_processors, process_files};

const PREPUBLISH_SCRIPT: &str = "vscode:prepublish";

/// Above either limit the extension should be bundled.
const MAX_RECOMMENDED_FILES: usize = 5000;
const MAX_RECOMMENDED_JS_FILES: usize = 100;

/// Outcome of a successful [`pack`].
#[derive(Debug, Clone)]
pub struct PackResult {
    pub manifest: Manifest,
    pub package_path: PathBuf,
    /// Archive entry paths, in archive order.
    pub files: Vec<String>,
}

fn resolve_cwd(options: &PackOptions) -> Result<PathBuf> {
    options.resolve_cwd().map_err(|e| PackError::io(".", e))
}

/// Runs the discovery, ignore and processor stages and returns the archive
/// entries, descriptors first.
pub async fn collect<R>(manifest: &Manifest, options: &PackOptions, resolver: &R) -> Result<Vec<PackFile>>
where
    R: DependencyResolver + ?Sized,
{
    let cwd = resolve_cwd(options)?;
    let mut processors = create_default_processors(manifest, options);
    let names = collect_files(
        &cwd,
        resolver,
        options.package_manager,
        options.dependency_entry_points.as_deref(),
        options.ignore_file(),
    )
    .await?;
    let files = names.iter().map(|name| PackFile::local(&cwd, name)).collect();
    process_files(&mut processors, files).await
}

pub fn default_package_name(manifest: &Manifest) -> String {
    format!("{}-{}.vsix", manifest.name, manifest.version)
}

/// Output location: the default name in `cwd`, the default name inside an
/// existing directory, or the explicit path as given.
pub async fn package_path(cwd: &Path, manifest: &Manifest, options: &PackOptions) -> PathBuf {
    match &options.package_path {
        None => cwd.join(default_package_name(manifest)),
        Some(explicit) => match tokio::fs::metadata(explicit).await {
            Ok(meta) if meta.is_dir() => explicit.join(default_package_name(manifest)),
            _ => explicit.clone(),
        },
    }
}

/// Runs the manifest's prepublish script, if it declares one.
pub async fn prepublish(cwd: &Path, manifest: &Manifest, package_manager: PackageManager) -> Result<()> {
    if !manifest.scripts.contains_key(PREPUBLISH_SCRIPT) {
        return Ok(());
    }

    let tool = package_manager.tool();
    info!(tool, script = PREPUBLISH_SCRIPT, "Executing prepublish script");
    let status = Command::new(program(tool))
        .args(["run", PREPUBLISH_SCRIPT])
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| PackError::io(cwd, e))?;

    if !status.success() {
        error!(tool, code = ?status.code(), "Prepublish script failed");
        return Err(PackError::Prepublish {
            tool,
            code: status.code(),
        });
    }
    Ok(())
}

fn warn_if_unbundled(files: &[PackFile]) {
    let js_files = files
        .iter()
        .filter(|f| f.path().to_ascii_lowercase().ends_with(".js"))
        .count();
    if files.len() > MAX_RECOMMENDED_FILES || js_files > MAX_RECOMMENDED_JS_FILES {
        warn!(
            files = files.len(),
            js_files,
            "This extension consists of {} files, out of which {} are JavaScript files. For \
             performance reasons, you should bundle your extension: \
             https://aka.ms/vscode-bundle-extension . You should also exclude unnecessary files by \
             adding them to your .vscodeignore: https://aka.ms/vscode-vscodeignore",
            files.len(),
            js_files
        );
    }
}

/// Reads the manifest, runs prepublish, collects and processes files and
/// writes the archive.
pub async fn pack<R>(options: &PackOptions, resolver: &R) -> Result<PackResult>
where
    R: DependencyResolver + ?Sized,
{
    let cwd = resolve_cwd(options)?;
    let manifest = read_manifest(&cwd, true).await?;
    if options.skip_prepublish {
        info!("Skipping prepublish script");
    } else {
        prepublish(&cwd, &manifest, options.package_manager).await?;
    }

    let files = collect(&manifest, options, resolver).await?;
    warn_if_unbundled(&files);

    let package_path = package_path(&cwd, &manifest, options).await;
    let entries: Vec<String> = files.iter().map(|f| f.path().to_string()).collect();
    write_vsix(files, &package_path).await?;

    Ok(PackResult {
        manifest,
        package_path,
        files: entries,
    })
}

/// Human-readable archive size, two decimals, in KB below one megabyte.
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes > 1_048_576.0 {
        format!("{}MB", (bytes / 10_485.76).round() / 100.0)
    } else {
        format!("{}KB", (bytes / 10.24).round() / 100.0)
    }
}

/// [`pack`], then prints a one-line summary.
pub async fn package_command<R>(options: &PackOptions, resolver: &R) -> Result<PackResult>
where
    R: DependencyResolver + ?Sized,
{
    let result = pack(options, resolver).await?;
    let size = tokio::fs::metadata(&result.package_path)
        .await
        .map_err(|e| PackError::io(&result.package_path, e))?
        .len();
    println!(
        "Packaged: {} ({} files, {})",
        result.package_path.display(),
        result.files.len(),
        format_size(size)
    );
    info!(
        path = %result.package_path.display(),
        files = result.files.len(),
        bytes = size,
        "Packaged extension"
    );
    Ok(result)
}

/// Project-relative paths that would be packaged. Does not run prepublish
/// or the processor chain.
pub async fn list_files<R>(options: &PackOptions, resolver: &R) -> Result<Vec<String>>
where
    R: DependencyResolver + ?Sized,
{
    let cwd = resolve_cwd(options)?;
    read_manifest(&cwd, true).await?;
    collect_files(
        &cwd,
        resolver,
        options.package_manager,
        options.dependency_entry_points.as_deref(),
        options.ignore_file(),
    )
    .await
}

/// Runs prepublish, then prints every file that would be packaged.
pub async fn ls<R>(options: &PackOptions, resolver: &R) -> Result<Vec<String>>
where
    R: DependencyResolver + ?Sized,
{
    let cwd = resolve_cwd(options)?;
    let manifest = read_manifest(&cwd, true).await?;
    if !options.skip_prepublish {
        prepublish(&cwd, &manifest, options.package_manager).await?;
    }
    let files = collect_files(
        &cwd,
        resolver,
        options.package_manager,
        options.dependency_entry_points.as_deref(),
        options.ignore_file(),
    )
    .await?;
    for file in &files {
        println!("{file}");
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_switch_units_above_a_megabyte() {
        assert_eq!(format_size(2048), "2KB");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(3 * 1_048_576), "3MB");
    }

    #[tokio::test]
    async fn package_path_prefers_directories_for_the_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            name: "thing".into(),
            version: "1.2.3".into(),
            ..Manifest::default()
        };
        let mut options = PackOptions::for_project(dir.path());
        assert_eq!(
            package_path(dir.path(), &manifest, &options).await,
            dir.path().join("thing-1.2.3.vsix")
        );
        options.package_path = Some(dir.path().to_path_buf());
        assert_eq!(
            package_path(dir.path(), &manifest, &options).await,
            dir.path().join("thing-1.2.3.vsix")
        );
        options.package_path = Some(dir.path().join("custom.vsix"));
        assert_eq!(
            package_path(dir.path(), &manifest, &options).await,
            dir.path().join("custom.vsix")
        );
    }
}
