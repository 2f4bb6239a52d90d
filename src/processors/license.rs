use std::path::Path;
use std::sync::{LazyLock, Mutex, PoisonError};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Asset, AssetLog, Processor, VsixFields};
use crate::error::Result;
use crate::files::{PackFile, ROOT_SEGMENT};
use crate::manifest::Manifest;

pub const LICENSE_ASSET: &str = "Microsoft.VisualStudio.Services.Content.License";

static SEE_LICENSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SEE LICENSE IN (.*)$").expect("license redirect regex is valid"));

static DEFAULT_LICENSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^extension/license(\.(md|txt))?$").expect("license regex is valid")
});

/// Locates the license file, either by conventional name or through a
/// `SEE LICENSE IN <file>` redirect in the manifest.
pub struct LicenseProcessor {
    filter: Regex,
    found: Mutex<Option<String>>,
    assets: AssetLog,
    license: Option<String>,
}

impl LicenseProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        let redirect = manifest
            .license
            .as_deref()
            .and_then(|license| SEE_LICENSE_RE.captures(license))
            .and_then(|caps| caps.get(1))
            .map(|target| target.as_str().to_string())
            .filter(|target| !target.is_empty());

        let filter = match redirect {
            Some(target) => {
                let pattern = format!("^{ROOT_SEGMENT}/{}$", regex::escape(&target));
                Regex::new(&pattern).unwrap_or_else(|e| {
                    warn!(target = %target, error = %e, "Unusable license redirect, using defaults");
                    DEFAULT_LICENSE_RE.clone()
                })
            }
            None => DEFAULT_LICENSE_RE.clone(),
        };

        Self {
            filter,
            found: Mutex::new(None),
            assets: AssetLog::default(),
            license: None,
        }
    }
}

#[async_trait]
impl Processor for LicenseProcessor {
    fn name(&self) -> &'static str {
        "license"
    }

    /// The first matching file processed becomes the license; only that
    /// file is renamed when it has no extension.
    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        let mut path = file.normalized_path();
        if !self.filter.is_match(&path) {
            return Ok(file);
        }

        let mut found = self.found.lock().unwrap_or_else(PoisonError::into_inner);
        if found.is_some() {
            debug!(path = %path, "License already found, ignoring candidate");
            return Ok(file);
        }
        let file = if Path::new(&path).extension().is_none() {
            path.push_str(".txt");
            let renamed = format!("{}.txt", file.path());
            file.with_path(renamed)
        } else {
            file
        };
        *found = Some(path);
        Ok(file)
    }

    async fn on_end(&mut self) -> Result<()> {
        let found = self.found.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = found.take() {
            debug!(path = %path, "Found license");
            self.assets.push(Asset::new(LICENSE_ASSET, path.clone()));
            self.license = Some(path);
        }
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.snapshot()
    }

    fn vsix(&self) -> VsixFields {
        let mut fields = VsixFields::new();
        fields.insert(
            "license".to_string(),
            self.license.clone().map(Value::String).unwrap_or(Value::Null),
        );
        fields
    }
}
