//! Extension manifest (`package.json`) model, reader and translation overlay.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{PackError, Result};
use crate::validation::validate_manifest;

pub const MANIFEST_FILE: &str = "package.json";
pub const MANIFEST_NLS_FILE: &str = "package.nls.json";

/// Either a single value or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// A URL given either as a bare string or as `{ "url": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UrlField {
    Plain(String),
    Object {
        #[serde(default)]
        url: Option<String>,
    },
}

impl UrlField {
    pub fn url(&self) -> Option<&str> {
        match self {
            UrlField::Plain(url) => Some(url),
            UrlField::Object { url } => url.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QnaField {
    Flag(bool),
    Link(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct GalleryBanner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Badge {
    pub url: String,
    pub href: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Translation {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Localization {
    pub language_id: String,
    #[serde(default)]
    pub language_name: Option<String>,
    #[serde(default)]
    pub localized_language_name: Option<String>,
    #[serde(default)]
    pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageContribution {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrammarContribution {
    #[serde(default)]
    pub language: Option<String>,
}

/// `contributes` section. Points the pipeline inspects structurally are
/// typed; all others are kept raw.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Contributes {
    #[serde(default)]
    pub localizations: Vec<Localization>,
    #[serde(default)]
    pub languages: Vec<LanguageContribution>,
    #[serde(default)]
    pub grammars: Vec<GrammarContribution>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Contributes {
    /// True when the named contribution point is a non-empty list.
    pub fn contributes(&self, point: &str) -> bool {
        match point {
            "localizations" => !self.localizations.is_empty(),
            "languages" => !self.languages.is_empty(),
            "grammars" => !self.grammars.is_empty(),
            _ => matches!(self.other.get(point), Some(Value::Array(items)) if !items.is_empty()),
        }
    }

    /// Names of every declared contribution point.
    pub fn points(&self) -> impl Iterator<Item = &str> {
        let typed: [(&str, bool); 3] = [
            ("localizations", !self.localizations.is_empty()),
            ("languages", !self.languages.is_empty()),
            ("grammars", !self.grammars.is_empty()),
        ];
        typed
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| name)
            .chain(self.other.keys().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub engines: Option<HashMap<String, String>>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub repository: Option<UrlField>,
    #[serde(default)]
    pub bugs: Option<UrlField>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub qna: Option<QnaField>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub gallery_banner: Option<GalleryBanner>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub extension_dependencies: Vec<String>,
    #[serde(default)]
    pub extension_pack: Vec<String>,
    #[serde(default)]
    pub extension_kind: Option<OneOrMany>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub contributes: Option<Contributes>,
    #[serde(default)]
    pub activation_events: Vec<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: HashMap<String, String>,
    #[serde(default)]
    pub scripts: HashMap<String, String>,
}

/// Contribution points that tie an extension to the workspace host.
const WORKSPACE_EXTENSION_POINTS: &[&str] = &["terminal", "debuggers", "jsonValidation"];

impl Manifest {
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn engine(&self) -> Option<&str> {
        self.engines
            .as_ref()
            .and_then(|engines| engines.get("vscode"))
            .map(String::as_str)
    }

    /// Whether a repository is declared at all. Any object counts, even one
    /// without a `url`.
    pub fn has_repository(&self) -> bool {
        match &self.repository {
            Some(UrlField::Plain(url)) => !url.is_empty(),
            Some(UrlField::Object { .. }) => true,
            None => false,
        }
    }

    /// Repository URL with the `owner/repo` shorthand expanded to GitHub.
    pub fn repository_url(&self) -> Option<String> {
        let url = self.repository.as_ref()?.url()?;
        let mut parts = url.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Some(format!("https://github.com/{owner}/{repo}.git"))
            }
            _ => Some(url.to_string()),
        }
    }

    pub fn is_string_extension_kind(&self) -> bool {
        matches!(self.extension_kind, Some(OneOrMany::One(_)))
    }

    /// Where the extension may run. Explicit declarations win; otherwise
    /// the kind is inferred from entry points, dependencies and
    /// contribution points, defaulting to everywhere.
    pub fn extension_kind(&self) -> Vec<String> {
        match &self.extension_kind {
            Some(OneOrMany::Many(kinds)) => return kinds.clone(),
            Some(OneOrMany::One(kind)) if kind == "ui" => {
                return vec!["ui".to_string(), "workspace".to_string()]
            }
            Some(OneOrMany::One(kind)) => return vec![kind.clone()],
            None => {}
        }

        let kinds: &[&str] = if self.main.is_some() {
            if self.browser.is_some() {
                &["workspace", "web"]
            } else {
                &["workspace"]
            }
        } else if self.browser.is_some() {
            &["web"]
        } else if !self.extension_dependencies.is_empty() || !self.extension_pack.is_empty() {
            &["workspace"]
        } else if self.contributes.as_ref().is_some_and(|c| {
            c.points()
                .any(|point| WORKSPACE_EXTENSION_POINTS.contains(&point))
        }) {
            &["workspace"]
        } else {
            &["ui", "workspace", "web"]
        };
        kinds.iter().map(|k| k.to_string()).collect()
    }

    pub fn is_web_kind(&self) -> bool {
        self.extension_kind().iter().any(|kind| kind == "web")
    }
}

/// Replaces every `%key%` string in `value` with its translation.
pub fn patch_nls(value: &mut Value, translations: &Map<String, Value>) {
    match value {
        Value::String(s) => {
            let key = s
                .strip_prefix('%')
                .and_then(|rest| rest.strip_suffix('%'));
            if let Some(Value::String(translated)) = key.and_then(|k| translations.get(k)) {
                *s = translated.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| patch_nls(v, translations)),
        Value::Object(map) => map.values_mut().for_each(|v| patch_nls(v, translations)),
        _ => {}
    }
}

/// Reads and validates `package.json` from `cwd`, applying the
/// `package.nls.json` overlay when `nls` is set.
pub async fn read_manifest(cwd: &Path, nls: bool) -> Result<Manifest> {
    let manifest_path = cwd.join(MANIFEST_FILE);
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|_| PackError::ManifestNotFound {
            path: manifest_path.clone(),
        })?;
    let mut value: Value = serde_json::from_str(&raw).map_err(|e| PackError::ManifestParse {
        path: manifest_path.clone(),
        reason: e.to_string(),
    })?;

    let parsed = Manifest::from_value(value.clone()).map_err(|e| PackError::ManifestParse {
        path: manifest_path.clone(),
        reason: e.to_string(),
    })?;
    validate_manifest(&parsed)?;

    if !nls {
        info!(name = %parsed.name, version = %parsed.version, "Read manifest");
        return Ok(parsed);
    }

    let nls_path = cwd.join(MANIFEST_NLS_FILE);
    let raw_nls = match tokio::fs::read_to_string(&nls_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "{}".to_string(),
        Err(e) => return Err(PackError::io(nls_path, e)),
    };
    let translations: Map<String, Value> =
        serde_json::from_str(&raw_nls).map_err(|e| PackError::ManifestParse {
            path: nls_path.clone(),
            reason: e.to_string(),
        })?;
    debug!(translations = translations.len(), "Applying manifest translations");

    patch_nls(&mut value, &translations);
    let manifest = Manifest::from_value(value).map_err(|e| PackError::ManifestParse {
        path: manifest_path,
        reason: e.to_string(),
    })?;
    info!(name = %manifest.name, version = %manifest.version, "Read manifest");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(value).unwrap()
    }

    #[test]
    fn extension_kind_defaults_to_everywhere() {
        assert_eq!(manifest(json!({})).extension_kind(), vec!["ui", "workspace", "web"]);
    }

    #[test]
    fn extension_kind_is_inferred_from_entry_points() {
        assert_eq!(manifest(json!({"main": "a.js"})).extension_kind(), vec!["workspace"]);
        assert_eq!(
            manifest(json!({"main": "a.js", "browser": "b.js"})).extension_kind(),
            vec!["workspace", "web"]
        );
        assert_eq!(manifest(json!({"browser": "b.js"})).extension_kind(), vec!["web"]);
        assert_eq!(
            manifest(json!({"extensionPack": ["a.b"]})).extension_kind(),
            vec!["workspace"]
        );
        assert_eq!(
            manifest(json!({"contributes": {"debuggers": []}})).extension_kind(),
            vec!["workspace"]
        );
    }

    #[test]
    fn explicit_extension_kind_wins() {
        assert_eq!(
            manifest(json!({"main": "a.js", "extensionKind": "ui"})).extension_kind(),
            vec!["ui", "workspace"]
        );
        assert_eq!(
            manifest(json!({"extensionKind": ["web"]})).extension_kind(),
            vec!["web"]
        );
    }

    #[test]
    fn repository_shorthand_expands_to_github() {
        let m = manifest(json!({"repository": "octo/thing"}));
        assert_eq!(m.repository_url().as_deref(), Some("https://github.com/octo/thing.git"));
        let m = manifest(json!({"repository": {"type": "git", "url": "https://gitlab.com/a/b"}}));
        assert_eq!(m.repository_url().as_deref(), Some("https://gitlab.com/a/b"));
    }

    #[test]
    fn nls_overlay_replaces_placeholders_everywhere() {
        let mut value = json!({
            "displayName": "%name%",
            "contributes": {"commands": [{"title": "%cmd.title%"}]},
            "description": "%missing%"
        });
        let translations = json!({"name": "Hello", "cmd.title": "Run"});
        patch_nls(&mut value, translations.as_object().unwrap());
        assert_eq!(value["displayName"], "Hello");
        assert_eq!(value["contributes"]["commands"][0]["title"], "Run");
        assert_eq!(value["description"], "%missing%");
    }
}
