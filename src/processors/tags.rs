use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::Processor;
use crate::error::Result;
use crate::manifest::Manifest;

/// Description keyword to topic tags.
pub const KEYWORDS: &[(&str, &[&str])] = &[
    ("git", &["git"]),
    ("npm", &["node"]),
    ("spell", &["markdown"]),
    ("bootstrap", &["bootstrap"]),
    ("lint", &["linters"]),
    ("linting", &["linters"]),
    ("react", &["javascript"]),
    ("js", &["javascript"]),
    ("node", &["javascript", "node"]),
    ("c++", &["c++"]),
    ("Cplusplus", &["c++"]),
    ("xml", &["xml"]),
    ("angular", &["javascript"]),
    ("jquery", &["javascript"]),
    ("php", &["php"]),
    ("python", &["python"]),
    ("latex", &["latex"]),
    ("ruby", &["ruby"]),
    ("java", &["java"]),
    ("erlang", &["erlang"]),
    ("sql", &["sql"]),
    ("nodejs", &["node"]),
    ("c#", &["c#"]),
    ("css", &["css"]),
    ("javascript", &["javascript"]),
    ("ftp", &["ftp"]),
    ("haskell", &["haskell"]),
    ("unity", &["unity"]),
    ("terminal", &["terminal"]),
    ("powershell", &["powershell"]),
    ("laravel", &["laravel"]),
    ("meteor", &["meteor"]),
    ("emmet", &["emmet"]),
    ("eslint", &["linters"]),
    ("tfs", &["tfs"]),
    ("rust", &["rust"]),
];

static KEYWORD_PATTERNS: LazyLock<Vec<(Regex, &'static [&'static str])>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .map(|(keyword, tags)| {
            let pattern = format!(r"(?i)\b(?:{})", regex::escape(keyword));
            (
                Regex::new(&pattern).expect("keyword regex is valid"),
                *tags,
            )
        })
        .collect()
});

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W").expect("non-word regex is valid"));

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whole-word, case-insensitive search. A match must start on a word
/// boundary and must not be followed by a word character.
fn mentions(pattern: &Regex, text: &str) -> bool {
    pattern
        .find_iter(text)
        .any(|m| !text[m.end()..].chars().next().is_some_and(is_word_char))
}

/// Topic tags triggered by keywords in a free-text description.
pub fn description_tags(description: &str) -> Vec<String> {
    KEYWORD_PATTERNS
        .iter()
        .filter(|(pattern, _)| mentions(pattern, description))
        .flat_map(|(_, tags)| tags.iter().map(|t| t.to_string()))
        .collect()
}

fn extension_tags(extensions: &[String]) -> impl Iterator<Item = String> + '_ {
    extensions
        .iter()
        .map(|ext| NON_WORD_RE.replace_all(ext, "").into_owned())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("__ext_{ext}"))
}

/// Unions explicit keywords with tags derived from contributions,
/// activation events and the description.
pub fn derive_tags(manifest: &Manifest) -> Vec<String> {
    let mut tags: Vec<String> = manifest.keywords.clone();

    if let Some(contributes) = &manifest.contributes {
        let derived: [(&str, &[&str]); 6] = [
            ("themes", &["theme", "color-theme"]),
            ("iconThemes", &["theme", "icon-theme"]),
            ("snippets", &["snippet"]),
            ("keybindings", &["keybindings"]),
            ("debuggers", &["debuggers"]),
            ("jsonValidation", &["json"]),
        ];
        for (point, point_tags) in derived {
            if contributes.contributes(point) {
                tags.extend(point_tags.iter().map(|t| t.to_string()));
            }
        }

        for localization in &contributes.localizations {
            let language = &localization.language_id;
            tags.push(format!("lp-{language}"));
            for translation in &localization.translations {
                tags.push(format!("__lp_{}", translation.id));
                tags.push(format!("__lp-{language}_{}", translation.id));
            }
        }

        for language in &contributes.languages {
            tags.extend(language.id.iter().cloned());
            tags.extend(language.aliases.iter().cloned());
            tags.extend(extension_tags(&language.extensions));
        }

        tags.extend(
            contributes
                .grammars
                .iter()
                .filter_map(|grammar| grammar.language.clone()),
        );
    }

    tags.extend(
        manifest
            .activation_events
            .iter()
            .filter_map(|event| event.strip_prefix("onLanguage:"))
            .map(str::to_string),
    );

    if let Some(description) = &manifest.description {
        tags.extend(description_tags(description));
    }

    dedupe_tags(tags)
}

/// Drops duplicates and empty tags, keeping first-seen order.
pub fn dedupe_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for tag in tags {
        if !tag.is_empty() && !unique.contains(&tag) {
            unique.push(tag);
        }
    }
    unique
}

/// Search tags for the marketplace listing.
pub struct TagsProcessor {
    manifest: Manifest,
    tags: Vec<String>,
}

impl TagsProcessor {
    pub fn new(manifest: &Manifest) -> Self {
        Self {
            manifest: manifest.clone(),
            tags: Vec::new(),
        }
    }
}

#[async_trait]
impl Processor for TagsProcessor {
    fn name(&self) -> &'static str {
        "tags"
    }

    async fn on_end(&mut self) -> Result<()> {
        self.tags = derive_tags(&self.manifest);
        debug!(tags = ?self.tags, "Derived tags");
        Ok(())
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }
}
