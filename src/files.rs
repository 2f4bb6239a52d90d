//! Logical files flowing through the pipeline.

use std::path::{Path, PathBuf};

use crate::error::{PackError, Result};

/// Root segment every archive entry for project content lives under.
pub const ROOT_SEGMENT: &str = "extension";

/// A file destined for the archive, identified by its archive-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackFile {
    /// Backed by a file on disk; content is read only when needed.
    Local { path: String, local_path: PathBuf },
    /// Content already materialised, usually by a processor rewrite.
    InMemory { path: String, contents: Vec<u8> },
}

impl PackFile {
    /// Disk-backed file for a project-relative path (forward slashes).
    pub fn local(cwd: &Path, relative: &str) -> Self {
        PackFile::Local {
            path: format!("{ROOT_SEGMENT}/{relative}"),
            local_path: cwd.join(relative),
        }
    }

    pub fn in_memory(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        PackFile::InMemory {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            PackFile::Local { path, .. } | PackFile::InMemory { path, .. } => path,
        }
    }

    /// Path with backslashes turned into forward slashes.
    pub fn normalized_path(&self) -> String {
        normalize(self.path())
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, PackFile::InMemory { .. })
    }

    /// Same content under a different archive path.
    pub fn with_path(self, new_path: impl Into<String>) -> Self {
        let path = new_path.into();
        match self {
            PackFile::Local { local_path, .. } => PackFile::Local { path, local_path },
            PackFile::InMemory { contents, .. } => PackFile::InMemory { path, contents },
        }
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            PackFile::InMemory { contents, .. } => Ok(contents.clone()),
            PackFile::Local { local_path, .. } => tokio::fs::read(local_path)
                .await
                .map_err(|e| PackError::io(local_path, e)),
        }
    }

    pub async fn read_to_string(&self) -> Result<String> {
        let bytes = self.read_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}
