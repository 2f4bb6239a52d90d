//! Error taxonomy for the packaging pipeline.
//!
//! Every variant is fatal to a pack operation. Advisory conditions are not
//! errors; they are emitted through `tracing::warn!` at the point they are
//! detected.

use std::path::PathBuf;

use thiserror::Error;

use crate::npm::NpmError;

pub type Result<T> = std::result::Result<T, PackError>;

#[derive(Debug, Error)]
pub enum PackError {
    // Input errors
    #[error("Extension manifest not found: {}", .path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("Error parsing '{}': not a valid JSON file ({reason})", .path.display())]
    ManifestParse { path: PathBuf, reason: String },

    #[error("Manifest missing field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid manifest field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    // Content-safety violations
    #[error("Make sure to edit the {document} file before you package or publish your extension.")]
    UnexpandedReadme { document: String },

    #[error(
        "Couldn't detect the repository where this extension is published. The {kind} '{link}' \
         will be broken in {document}. Please provide the repository URL in package.json or use \
         the base content/images URL options."
    )]
    RelativeLinkWithoutRepository {
        document: String,
        kind: &'static str,
        link: String,
    },

    #[error("SVG data URLs are not allowed in {document}: {src}")]
    SvgDataUrl { document: String, src: String },

    #[error("Images in {document} must come from an HTTPS source: {src}")]
    InsecureImage { document: String, src: String },

    #[error("SVGs are restricted in {document}; please use other file image formats, such as PNG: {src}")]
    UntrustedSvg { document: String, src: String },

    #[error("SVG tags are not allowed in {document}.")]
    SvgTag { document: String },

    #[error("SVGs can't be used in a web extension: {path}")]
    WebExtensionSvg { path: String },

    #[error("Badge URLs must come from an HTTPS source: {url}")]
    InsecureBadge { url: String },

    #[error("Badge SVGs are restricted. Please use other file image formats, such as PNG: {url}")]
    UntrustedBadgeSvg { url: String },

    // Structural conflicts
    #[error(
        "The following files have the same case insensitive path, which isn't supported by the VSIX format:\n{}",
        bullet_list(.paths)
    )]
    DuplicatePaths { paths: Vec<String> },

    #[error("The specified icon '{icon}' wasn't found in the extension.")]
    IconNotFound { icon: String },

    #[error(
        "Cannot pack more than {limit} files in a web extension ({count} found). Use `vsix-pack ls` \
         to see all the files that will be packed and exclude those which are not needed in .vscodeignore."
    )]
    TooManyWebResources { count: usize, limit: usize },

    // Policy failures
    #[error("It's not allowed to use the '{publisher}' publisher.")]
    ReservedPublisher { publisher: String },

    #[error("A 'repository' field is missing from the 'package.json' manifest file. Aborted.")]
    MissingRepository,

    #[error("{tool} failed with exit code {code:?}")]
    Prepublish { tool: &'static str, code: Option<i32> },

    // Infrastructure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("Invalid ignore pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Dependency(#[from] NpmError),

    #[error("Background task failed: {0}")]
    Task(String),
}

fn bullet_list(paths: &[String]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PackError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error originates from a cancelled package-manager call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PackError::Dependency(NpmError::Cancelled))
    }
}
