use std::collections::HashMap;

use async_trait::async_trait;

use super::{Asset, AssetLog, Processor};
use crate::error::Result;
use crate::files::{normalize, PackFile, ROOT_SEGMENT};
use crate::manifest::Manifest;

pub const TRANSLATION_ASSET_PREFIX: &str = "Microsoft.VisualStudio.Code.Translation.";

/// Translation id that carries editor strings.
const EDITOR_TRANSLATION_ID: &str = "vscode";

/// Records translation files declared by localization contributions.
pub struct NlsProcessor {
    /// Archive path to upper-cased language id.
    translations: HashMap<String, String>,
    assets: AssetLog,
}

impl NlsProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        // Later declarations for the same language replace earlier ones.
        let mut by_language: HashMap<String, String> = HashMap::new();
        let localizations = manifest
            .contributes
            .iter()
            .flat_map(|contributes| contributes.localizations.iter());
        for localization in localizations {
            for translation in &localization.translations {
                let Some(path) = translation
                    .path
                    .as_deref()
                    .filter(|_| translation.id == EDITOR_TRANSLATION_ID)
                else {
                    continue;
                };
                let path = path
                    .strip_prefix("./")
                    .or_else(|| path.strip_prefix(".\\"))
                    .unwrap_or(path);
                by_language.insert(
                    localization.language_id.to_uppercase(),
                    format!("{ROOT_SEGMENT}/{}", normalize(path)),
                );
            }
        }

        Self {
            translations: by_language
                .into_iter()
                .map(|(language, path)| (path, language))
                .collect(),
            assets: AssetLog::default(),
        }
    }
}

#[async_trait]
impl Processor for NlsProcessor {
    fn name(&self) -> &'static str {
        "nls"
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        let path = file.normalized_path();
        if let Some(language) = self.translations.get(&path) {
            self.assets
                .push(Asset::new(format!("{TRANSLATION_ASSET_PREFIX}{language}"), path));
        }
        Ok(file)
    }

    async fn on_end(&mut self) -> Result<()> {
        self.assets.sort_by_path();
        Ok(())
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_translation_per_language_wins() {
        let manifest = Manifest::from_value(json!({
            "contributes": {"localizations": [
                {"languageId": "de", "translations": [{"id": "vscode", "path": "./old/de.json"}]},
                {"languageId": "DE", "translations": [
                    {"id": "vscode", "path": "./i18n/de.json"},
                    {"id": "other.ext", "path": "./i18n/other.json"}
                ]}
            ]}
        }))
        .unwrap();
        let mut processor = NlsProcessor::new(&manifest);
        for path in ["extension/old/de.json", "extension/i18n/de.json", "extension/i18n/other.json"] {
            processor
                .on_file(PackFile::in_memory(path, b"{}".to_vec()))
                .await
                .unwrap();
        }
        processor.on_end().await.unwrap();
        assert_eq!(
            processor.assets(),
            vec![Asset::new(
                "Microsoft.VisualStudio.Code.Translation.DE",
                "extension/i18n/de.json"
            )]
        );
    }
}
