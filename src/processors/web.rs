use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use super::{Asset, AssetLog, Processor, VsixFields};
use crate::error::{PackError, Result};
use crate::files::PackFile;
use crate::manifest::Manifest;

pub const WEB_RESOURCE_ASSET_PREFIX: &str = "Microsoft.VisualStudio.Code.WebResources/";
pub const WEB_EXTENSION_TAG: &str = "__web_extension";
/// Largest number of files a web extension may ship.
pub const MAX_WEB_RESOURCES: usize = 25;

/// Classifies every file of a web-capable extension as a web resource.
pub struct WebExtensionProcessor {
    enabled: bool,
    assets: AssetLog,
}

impl WebExtensionProcessor {
    pub fn new(manifest: &Manifest, web: bool) -> Self {
        Self {
            enabled: web && manifest.is_web_kind(),
            assets: AssetLog::default(),
        }
    }
}

#[async_trait]
impl Processor for WebExtensionProcessor {
    fn name(&self) -> &'static str {
        "web-extension"
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        if !self.enabled {
            return Ok(file);
        }
        let path = file.normalized_path();
        if path.to_ascii_lowercase().ends_with(".svg") {
            return Err(PackError::WebExtensionSvg { path });
        }
        self.assets.push(Asset::new(
            format!("{WEB_RESOURCE_ASSET_PREFIX}{path}"),
            path,
        ));
        Ok(file)
    }

    async fn on_end(&mut self) -> Result<()> {
        let count = self.assets.len();
        if count > MAX_WEB_RESOURCES {
            error!(count, limit = MAX_WEB_RESOURCES, "Too many web resources");
            return Err(PackError::TooManyWebResources {
                count,
                limit: MAX_WEB_RESOURCES,
            });
        }
        if self.enabled {
            self.assets.sort_by_path();
            info!(resources = count, "Packaging as web extension");
        }
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.snapshot()
    }

    fn tags(&self) -> Vec<String> {
        if self.enabled {
            vec![WEB_EXTENSION_TAG.to_string()]
        } else {
            Vec::new()
        }
    }

    fn vsix(&self) -> VsixFields {
        let mut fields = VsixFields::new();
        if self.enabled {
            fields.insert("webExtension".to_string(), Value::Bool(true));
        }
        fields
    }
}
