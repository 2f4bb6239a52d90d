//! Long-text documents: link rewriting, issue expansion and safety checks.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::debug;

use super::content_safety::{check_markdown, is_github_repository};
use super::{Asset, AssetLog, Processor};
use crate::config::PackOptions;
use crate::error::{PackError, Result};
use crate::files::PackFile;
use crate::manifest::Manifest;

pub const DETAILS_ASSET: &str = "Microsoft.VisualStudio.Services.Content.Details";
pub const CHANGELOG_ASSET: &str = "Microsoft.VisualStudio.Services.Content.Changelog";

const DEFAULT_BRANCH: &str = "master";
const BOILERPLATE: &str = "This is the README for your extension ";

static README_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^extension/readme\.md$").expect("readme regex is valid"));

static CHANGELOG_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^extension/changelog\.md$").expect("changelog regex is valid")
});

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]\[]*|!\[[^\]\[]*]\([^\)]+\))\]\(([^\)]+)\)")
        .expect("markdown link regex is valid")
});

static IMG_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img.+?src=["']([/.\w\s-]+)['"].*?>"#).expect("img tag regex is valid")
});

static ISSUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\s|\n)([\w\d_-]+/[\w\d_-]+)?#(\d+)\b").expect("issue regex is valid")
});

static ABSOLUTE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+://").expect("absolute url regex is valid"));

static GITHUB_REPOSITORY_PARTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([^/]+)/([^/]+)(/|$)").expect("github parts regex is valid")
});

/// Base URLs guessed from a GitHub repository link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessedUrls {
    pub content: String,
    pub images: String,
    pub repository: String,
}

pub fn guess_base_urls(repository: &str, branch: Option<&str>) -> Option<GuessedUrls> {
    let caps = GITHUB_REPOSITORY_PARTS_RE.captures(repository)?;
    let account = &caps[1];
    let name = caps[2]
        .strip_suffix(".git")
        .or_else(|| caps[2].strip_suffix(".GIT"))
        .unwrap_or(&caps[2]);
    let branch = branch.unwrap_or(DEFAULT_BRANCH);
    Some(GuessedUrls {
        content: format!("https://github.com/{account}/{name}/blob/{branch}"),
        images: format!("https://github.com/{account}/{name}/raw/{branch}"),
        repository: format!("https://github.com/{account}/{name}"),
    })
}

fn is_relative_link(link: &str) -> bool {
    !ABSOLUTE_URL_RE.is_match(link) && !link.starts_with('#')
}

/// Joins URL segments with exactly one slash between them.
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_start_matches("./").trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        joined.push('/');
        joined.push_str(segment);
    }
    joined
}

/// Rewrites one long-text document (README or CHANGELOG).
pub struct MarkdownProcessor {
    document: &'static str,
    path_pattern: &'static Regex,
    asset_type: &'static str,
    base_content_url: Option<String>,
    base_images_url: Option<String>,
    repository_url: Option<String>,
    expand_issue_links: bool,
    assets: AssetLog,
}

impl MarkdownProcessor {
    fn new(
        manifest: &Manifest,
        options: &PackOptions,
        document: &'static str,
        path_pattern: &'static Regex,
        asset_type: &'static str,
    ) -> Self {
        let guess = manifest
            .repository_url()
            .and_then(|repo| guess_base_urls(&repo, options.github_branch.as_deref()));
        let base_content_url = options
            .base_content_url
            .clone()
            .or_else(|| guess.as_ref().map(|g| g.content.clone()));
        let base_images_url = options
            .base_images_url
            .clone()
            .or_else(|| options.base_content_url.clone())
            .or_else(|| guess.as_ref().map(|g| g.images.clone()));

        Self {
            document,
            path_pattern,
            asset_type,
            base_content_url,
            base_images_url,
            repository_url: guess.map(|g| g.repository),
            expand_issue_links: options.expand_github_issue_links,
            assets: AssetLog::default(),
        }
    }

    pub fn readme(manifest: &Manifest, options: &PackOptions) -> Self {
        Self::new(manifest, options, "README.md", &*README_PATH_RE, DETAILS_ASSET)
    }

    pub fn changelog(manifest: &Manifest, options: &PackOptions) -> Self {
        Self::new(
            manifest,
            options,
            "CHANGELOG.md",
            &*CHANGELOG_PATH_RE,
            CHANGELOG_ASSET,
        )
    }

    fn missing_base(&self, kind: &'static str, link: &str) -> PackError {
        PackError::RelativeLinkWithoutRepository {
            document: self.document.to_string(),
            kind,
            link: link.to_string(),
        }
    }

    /// Rewrites markdown links and images, recursing into link titles so
    /// that image badges wrapped in links are rewritten too.
    fn rewrite_links(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in LINK_RE.captures_iter(text) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..whole.start]);
            out.push_str(&self.rewrite_link(&caps)?);
            last = whole.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn rewrite_link(&self, caps: &Captures<'_>) -> Result<String> {
        let bang = &caps[1];
        let title = &caps[2];
        let link = &caps[3];
        let is_image = !bang.is_empty();

        if link.to_ascii_lowercase().starts_with("mailto:") {
            return Ok(format!("{bang}[{title}]({link})"));
        }

        let relative = is_relative_link(link);
        if relative && self.base_content_url.is_none() && self.base_images_url.is_none() {
            return Err(self.missing_base(if is_image { "image" } else { "link" }, link));
        }

        let title = self.rewrite_links(title)?;
        let prefix = if is_image {
            &self.base_images_url
        } else {
            &self.base_content_url
        };
        match prefix {
            Some(prefix) if relative => Ok(format!("{bang}[{title}]({})", join_url(prefix, &[link]))),
            _ => Ok(format!("{bang}[{title}]({link})")),
        }
    }

    fn rewrite_img_tags(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in IMG_TAG_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let link = &caps[1];
            out.push_str(&text[last..whole.start()]);

            let relative = is_relative_link(link);
            match &self.base_images_url {
                None if relative => return Err(self.missing_base("image", link)),
                Some(prefix) if relative => {
                    out.push_str(&whole.as_str().replacen(link, &join_url(prefix, &[link]), 1))
                }
                _ => out.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn expand_issues(&self, text: &str, repository: &str) -> String {
        ISSUE_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let prefix = &caps[1];
                let number = &caps[3];
                match caps.get(2).and_then(|m| m.as_str().split_once('/')) {
                    Some((owner, name)) => format!(
                        "{prefix}[{owner}/{name}#{number}]({})",
                        join_url("https://github.com", &[owner, name, "issues", number])
                    ),
                    None => format!(
                        "{prefix}[#{number}]({})",
                        join_url(repository, &["issues", number])
                    ),
                }
            })
            .into_owned()
    }

    /// Full rewrite of a document body.
    pub fn rewrite(&self, contents: &str) -> Result<String> {
        if contents.contains(BOILERPLATE) {
            return Err(PackError::UnexpandedReadme {
                document: self.document.to_string(),
            });
        }

        let mut contents = self.rewrite_links(contents)?;
        contents = self.rewrite_img_tags(&contents)?;

        if self.expand_issue_links {
            if let Some(repository) = self
                .repository_url
                .as_deref()
                .filter(|r| is_github_repository(r))
            {
                contents = self.expand_issues(&contents, repository);
            }
        }

        check_markdown(self.document, &contents)?;
        Ok(contents)
    }
}

#[async_trait]
impl Processor for MarkdownProcessor {
    fn name(&self) -> &'static str {
        self.document
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        let path = file.normalized_path();
        if !self.path_pattern.is_match(&path) {
            return Ok(file);
        }

        let contents = file.read_to_string().await?;
        let rewritten = self.rewrite(&contents)?;
        self.assets.push(Asset::new(self.asset_type, path.clone()));
        debug!(document = self.document, path = %path, "Rewrote long-text document");
        Ok(PackFile::in_memory(file.path(), rewritten.into_bytes()))
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.snapshot()
    }
}
