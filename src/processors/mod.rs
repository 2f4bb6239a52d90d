//! Content processor chain.
//!
//! Every file passes through each processor in declaration order. Files are
//! processed concurrently with one another; the chain for a single file is
//! strictly sequential. Once every file is done, processors are finalized one
//! at a time in declaration order and their contributions merged into the
//! package descriptor.

pub mod content_safety;
pub mod icon;
pub mod license;
pub mod manifest;
pub mod markdown;
pub mod nls;
pub mod tags;
pub mod validation;
pub mod web;

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::try_join_all;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::PackOptions;
use crate::error::Result;
use crate::files::PackFile;
use crate::manifest::Manifest;
use crate::vsix::{render_content_types, render_vsix_manifest, PackageDescriptor};

pub use self::icon::IconProcessor;
pub use self::license::LicenseProcessor;
pub use self::manifest::ManifestProcessor;
pub use self::markdown::MarkdownProcessor;
pub use self::nls::NlsProcessor;
pub use self::tags::TagsProcessor;
pub use self::validation::ValidationProcessor;
pub use self::web::WebExtensionProcessor;

/// Archive path of the rendered package manifest.
pub const VSIX_MANIFEST_PATH: &str = "extension.vsixmanifest";
/// Archive path of the rendered content-type map.
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

/// Partial descriptor fields contributed by one processor.
pub type VsixFields = Map<String, Value>;

/// A distinguished file recorded against the package descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub asset_type: String,
    pub path: String,
}

impl Asset {
    pub fn new(asset_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            asset_type: asset_type.into(),
            path: path.into(),
        }
    }
}

/// Append-only asset accumulator usable from concurrent per-file
/// transforms.
#[derive(Debug, Default)]
pub struct AssetLog {
    entries: Mutex<Vec<Asset>>,
}

impl AssetLog {
    pub fn push(&self, asset: Asset) {
        self.lock().push(asset);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Asset> {
        self.lock().clone()
    }

    /// Orders entries by path so the result does not depend on which file
    /// finished first.
    pub fn sort_by_path(&mut self) {
        self.entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .sort_by(|a, b| a.path.cmp(&b.path));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Asset>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One stage of the content pipeline.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-file transform. Returns the file unchanged, or a replacement that
    /// later processors and the archive writer see instead.
    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        Ok(file)
    }

    /// Runs once, after every file went through every processor.
    async fn on_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        Vec::new()
    }

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    fn vsix(&self) -> VsixFields {
        VsixFields::new()
    }
}

/// The closed set of processors a pack operation runs.
pub enum ContentProcessor {
    Manifest(ManifestProcessor),
    Tags(TagsProcessor),
    Readme(MarkdownProcessor),
    Changelog(MarkdownProcessor),
    License(LicenseProcessor),
    Icon(IconProcessor),
    Nls(NlsProcessor),
    WebExtension(WebExtensionProcessor),
    Validation(ValidationProcessor),
}

impl ContentProcessor {
    fn inner(&self) -> &dyn Processor {
        match self {
            ContentProcessor::Manifest(p) => p,
            ContentProcessor::Tags(p) => p,
            ContentProcessor::Readme(p) | ContentProcessor::Changelog(p) => p,
            ContentProcessor::License(p) => p,
            ContentProcessor::Icon(p) => p,
            ContentProcessor::Nls(p) => p,
            ContentProcessor::WebExtension(p) => p,
            ContentProcessor::Validation(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Processor {
        match self {
            ContentProcessor::Manifest(p) => p,
            ContentProcessor::Tags(p) => p,
            ContentProcessor::Readme(p) | ContentProcessor::Changelog(p) => p,
            ContentProcessor::License(p) => p,
            ContentProcessor::Icon(p) => p,
            ContentProcessor::Nls(p) => p,
            ContentProcessor::WebExtension(p) => p,
            ContentProcessor::Validation(p) => p,
        }
    }
}

#[async_trait]
impl Processor for ContentProcessor {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        self.inner().on_file(file).await
    }

    async fn on_end(&mut self) -> Result<()> {
        self.inner_mut().on_end().await
    }

    fn assets(&self) -> Vec<Asset> {
        self.inner().assets()
    }

    fn tags(&self) -> Vec<String> {
        self.inner().tags()
    }

    fn vsix(&self) -> VsixFields {
        self.inner().vsix()
    }
}

/// The default chain, in the order the package descriptor expects.
pub fn create_default_processors(manifest: &Manifest, options: &PackOptions) -> Vec<ContentProcessor> {
    vec![
        ContentProcessor::Manifest(ManifestProcessor::new(manifest, options.repository_policy)),
        ContentProcessor::Tags(TagsProcessor::new(manifest)),
        ContentProcessor::Readme(MarkdownProcessor::readme(manifest, options)),
        ContentProcessor::Changelog(MarkdownProcessor::changelog(manifest, options)),
        ContentProcessor::License(LicenseProcessor::new(manifest)),
        ContentProcessor::Icon(IconProcessor::new(manifest)),
        ContentProcessor::Nls(NlsProcessor::new(manifest)),
        ContentProcessor::WebExtension(WebExtensionProcessor::new(manifest, options.web)),
        ContentProcessor::Validation(ValidationProcessor::new()),
    ]
}

async fn run_chain<P: Processor>(chain: &[P], mut file: PackFile) -> Result<PackFile> {
    for processor in chain {
        file = processor.on_file(file).await?;
    }
    Ok(file)
}

/// Runs `files` through `processors`, finalizes them, and returns the
/// archive entries: the rendered manifest, the content-type map, then the
/// processed files in input order.
pub async fn process_files<P: Processor>(
    processors: &mut [P],
    files: Vec<PackFile>,
) -> Result<Vec<PackFile>> {
    let input_count = files.len();
    info!(files = input_count, processors = processors.len(), "Processing files");

    let chain: &[P] = processors;
    let processed = try_join_all(files.into_iter().map(|file| run_chain(chain, file)))
        .await
        .inspect_err(|e| error!(error = %e, "File processing failed"))?;

    for processor in processors.iter_mut() {
        debug!(processor = processor.name(), "Finalizing processor");
        if let Err(e) = processor.on_end().await {
            error!(processor = processor.name(), error = %e, "Processor finalize failed");
            return Err(e);
        }
    }

    let descriptor = PackageDescriptor::from_processors(processors);
    let vsix_manifest = render_vsix_manifest(&descriptor);
    let content_types = render_content_types(&processed);
    info!(
        assets = descriptor.assets.len(),
        tags = %descriptor.tags,
        "Rendered package descriptor"
    );

    let mut entries = Vec::with_capacity(processed.len() + 2);
    entries.push(PackFile::in_memory(VSIX_MANIFEST_PATH, vsix_manifest.into_bytes()));
    entries.push(PackFile::in_memory(CONTENT_TYPES_PATH, content_types.into_bytes()));
    entries.extend(processed);
    Ok(entries)
}
