use async_trait::async_trait;
use dialoguer::Confirm;
use is_terminal::IsTerminal;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::content_safety::is_github_repository;
use super::{Processor, VsixFields};
use crate::config::RepositoryPolicy;
use crate::error::{PackError, Result};
use crate::manifest::{Manifest, QnaField};

/// Publisher identity reserved for samples.
pub const RESERVED_PUBLISHER: &str = "vscode-samples";

/// Package identity and display fields.
pub struct ManifestProcessor {
    publisher: String,
    has_repository: bool,
    string_extension_kind: bool,
    repository_policy: RepositoryPolicy,
    fields: VsixFields,
}

fn unique_joined(items: &[String]) -> String {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(item) {
            seen.push(item.clone());
        }
    }
    seen.join(",")
}

impl ManifestProcessor {
    pub fn new(manifest: &Manifest, repository_policy: RepositoryPolicy) -> Self {
        let mut flags = vec!["Public"];
        if manifest.preview {
            flags.push("Preview");
        }

        let repository = manifest.repository_url();
        let mut links = json!({
            "repository": repository,
            "bugs": manifest.bugs.as_ref().and_then(|b| b.url()),
            "homepage": manifest.homepage,
        });
        if let Some(repository) = repository.as_deref().filter(|r| is_github_repository(r)) {
            links["github"] = Value::String(repository.to_string());
        }

        let (enable_qna, customer_qna) = match &manifest.qna {
            Some(QnaField::Link(link)) if link == "marketplace" => (Some(true), None),
            Some(QnaField::Link(link)) => (None, Some(link.clone())),
            Some(QnaField::Flag(false)) => (Some(false), None),
            Some(QnaField::Flag(true)) | None => (None, None),
        };

        let localized_languages = manifest
            .contributes
            .as_ref()
            .map(|c| {
                c.localizations
                    .iter()
                    .map(|l| {
                        l.localized_language_name
                            .as_deref()
                            .or(l.language_name.as_deref())
                            .unwrap_or(&l.language_id)
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();

        let fields = json!({
            "id": manifest.name,
            "displayName": manifest.display_name.as_deref().unwrap_or(&manifest.name),
            "version": manifest.version,
            "publisher": manifest.publisher,
            "engine": manifest.engine(),
            "description": manifest.description.as_deref().unwrap_or_default(),
            "categories": manifest.categories.join(","),
            "flags": flags.join(" "),
            "links": links,
            "galleryBanner": manifest.gallery_banner.clone().unwrap_or_default(),
            "badges": manifest.badges,
            "githubMarkdown": manifest.markdown.as_deref() != Some("standard"),
            "enableMarketplaceQnA": enable_qna,
            "customerQnALink": customer_qna,
            "extensionDependencies": unique_joined(&manifest.extension_dependencies),
            "extensionPack": unique_joined(&manifest.extension_pack),
            "extensionKind": manifest.extension_kind().join(","),
            "localizedLanguages": localized_languages,
        });

        Self {
            publisher: manifest.publisher.clone(),
            has_repository: manifest.has_repository(),
            string_extension_kind: manifest.is_string_extension_kind(),
            repository_policy,
            fields: match fields {
                Value::Object(map) => map,
                _ => VsixFields::new(),
            },
        }
    }
}

/// Applies `policy` to a manifest that declares no repository.
pub async fn confirm_missing_repository(policy: RepositoryPolicy) -> Result<()> {
    warn!("A 'repository' field is missing from the 'package.json' manifest file.");
    match policy {
        RepositoryPolicy::Continue => Ok(()),
        RepositoryPolicy::Fail => Err(PackError::MissingRepository),
        RepositoryPolicy::Prompt if !std::io::stdin().is_terminal() => {
            info!("Standard input is not a terminal, treating the repository prompt as declined");
            Err(PackError::MissingRepository)
        }
        RepositoryPolicy::Prompt => {
            let confirmed = tokio::task::spawn_blocking(|| {
                Confirm::new()
                    .with_prompt("Do you want to continue?")
                    .default(false)
                    .interact()
            })
            .await
            .map_err(|e| PackError::Task(e.to_string()))?
            .map_err(|e| PackError::Task(e.to_string()))?;
            if confirmed {
                Ok(())
            } else {
                Err(PackError::MissingRepository)
            }
        }
    }
}

#[async_trait]
impl Processor for ManifestProcessor {
    fn name(&self) -> &'static str {
        "manifest"
    }

    async fn on_end(&mut self) -> Result<()> {
        if self.string_extension_kind {
            warn!(
                "The 'extensionKind' property should be of type 'string[]'. Learn more at: \
                 https://aka.ms/vscode/api/incorrect-execution-location"
            );
        }
        if self.publisher == RESERVED_PUBLISHER {
            return Err(PackError::ReservedPublisher {
                publisher: self.publisher.clone(),
            });
        }
        if !self.has_repository {
            confirm_missing_repository(self.repository_policy).await?;
        }
        Ok(())
    }

    fn vsix(&self) -> VsixFields {
        self.fields.clone()
    }
}
