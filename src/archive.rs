//! Archive writer.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PackError, Result};
use crate::files::PackFile;

/// Writes `files` into a zip archive at `package_path`, replacing any
/// existing file there.
///
/// Entries are streamed into a temporary file next to the target which is
/// moved into place only once the archive is complete, so a failure never
/// leaves a truncated archive at `package_path`.
pub async fn write_vsix(files: Vec<PackFile>, package_path: &Path) -> Result<()> {
    match tokio::fs::remove_file(package_path).await {
        Ok(()) => debug!(path = %package_path.display(), "Removed previous package"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PackError::io(package_path, e)),
    }

    let target = package_path.to_path_buf();
    let entries = files.len();
    tokio::task::spawn_blocking(move || write_archive(files, &target))
        .await
        .map_err(|e| PackError::Task(e.to_string()))?
        .inspect_err(|e| error!(path = %package_path.display(), error = %e, "Failed to write package"))?;

    info!(path = %package_path.display(), entries, "Wrote package");
    Ok(())
}

/// Temporary archive next to the target, created with the usual mode for new
/// files (0666 less the umask) instead of tempfile's private 0600.
fn temp_archive(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".vsix-pack").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

fn write_archive(files: Vec<PackFile>, target: &Path) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = temp_archive(&dir).map_err(|e| PackError::io(&dir, e))?;

    let mut zip = ZipWriter::new(temp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        zip.start_file(file.path(), options)?;
        match file {
            PackFile::InMemory { contents, path } => {
                zip.write_all(&contents).map_err(|e| PackError::io(path, e))?
            }
            PackFile::Local { local_path, .. } => {
                let mut source =
                    File::open(&local_path).map_err(|e| PackError::io(&local_path, e))?;
                io::copy(&mut source, &mut zip).map_err(|e| PackError::io(&local_path, e))?;
            }
        }
    }

    let temp = zip.finish()?;
    temp.persist(target)
        .map_err(|e| PackError::io(target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn replaces_an_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.vsix");
        std::fs::write(&target, b"stale").unwrap();
        let source = dir.path().join("main.js");
        std::fs::write(&source, b"console.log(1)").unwrap();

        let files = vec![
            PackFile::in_memory("extension.vsixmanifest", b"<xml/>".to_vec()),
            PackFile::Local {
                path: "extension/main.js".to_string(),
                local_path: source,
            },
        ];
        write_vsix(files, &target).await.unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&target).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 2);
        let mut body = String::new();
        archive
            .by_name("extension/main.js")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "console.log(1)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn archive_gets_regular_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference");
        File::create(&reference).unwrap();
        let target = dir.path().join("out.vsix");
        let files = vec![PackFile::in_memory("extension.vsixmanifest", b"<xml/>".to_vec())];
        write_vsix(files, &target).await.unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&target), mode(&reference));
    }

    #[tokio::test]
    async fn missing_source_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.vsix");
        let files = vec![PackFile::Local {
            path: "extension/gone.js".to_string(),
            local_path: dir.path().join("gone.js"),
        }];
        assert!(write_vsix(files, &target).await.is_err());
        assert!(!target.exists());
    }
}
