use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use super::{Asset, AssetLog, Processor, VsixFields};
use crate::error::{PackError, Result};
use crate::files::{PackFile, ROOT_SEGMENT};
use crate::manifest::Manifest;

pub const ICON_ASSET: &str = "Microsoft.VisualStudio.Services.Icons.Default";

/// Records the declared icon; finalize fails if it never showed up.
pub struct IconProcessor {
    icon: Option<String>,
    assets: AssetLog,
}

impl IconProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        Self {
            icon: manifest
                .icon
                .as_ref()
                .map(|icon| format!("{ROOT_SEGMENT}/{icon}")),
            assets: AssetLog::default(),
        }
    }
}

#[async_trait]
impl Processor for IconProcessor {
    fn name(&self) -> &'static str {
        "icon"
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        if let Some(icon) = &self.icon {
            let path = file.normalized_path();
            if &path == icon {
                self.assets.push(Asset::new(ICON_ASSET, path));
            }
        }
        Ok(file)
    }

    async fn on_end(&mut self) -> Result<()> {
        match &self.icon {
            Some(icon) if self.assets.is_empty() => {
                error!(icon = %icon, "Declared icon not found among packaged files");
                Err(PackError::IconNotFound { icon: icon.clone() })
            }
            _ => Ok(()),
        }
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.snapshot()
    }

    fn vsix(&self) -> VsixFields {
        let found = self.icon.clone().filter(|_| !self.assets.is_empty());
        let mut fields = VsixFields::new();
        fields.insert(
            "icon".to_string(),
            found.map(Value::String).unwrap_or(Value::Null),
        );
        fields
    }
}
