//! Marketplace content-safety rules for images in long-text documents and
//! badges.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use pulldown_cmark::{Event, Options, Parser, Tag};
use regex::Regex;
use url::Url;

use crate::error::{PackError, Result};

/// Hosts allowed to serve SVG images. Maintained together with the
/// marketplace.
pub const TRUSTED_SVG_SOURCES: &[&str] = &[
    "api.bintray.com",
    "api.travis-ci.com",
    "api.travis-ci.org",
    "app.fossa.io",
    "badge.buildkite.com",
    "badge.fury.io",
    "badge.waffle.io",
    "badgen.net",
    "badges.frapsoft.com",
    "badges.gitter.im",
    "badges.greenkeeper.io",
    "cdn.travis-ci.com",
    "cdn.travis-ci.org",
    "ci.appveyor.com",
    "circleci.com",
    "cla.opensource.microsoft.com",
    "codacy.com",
    "codeclimate.com",
    "codecov.io",
    "coveralls.io",
    "david-dm.org",
    "deepscan.io",
    "dev.azure.com",
    "docs.rs",
    "flat.badgen.net",
    "gemnasium.com",
    "githost.io",
    "gitlab.com",
    "godoc.org",
    "goreportcard.com",
    "img.shields.io",
    "isitmaintained.com",
    "marketplace.visualstudio.com",
    "nodesecurity.io",
    "opencollective.com",
    "snyk.io",
    "travis-ci.com",
    "travis-ci.org",
    "visualstudio.com",
    "vsmarketplacebadge.apphb.com",
    "www.bithound.io",
    "www.versioneye.com",
];

static GITHUB_REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/|^git@github\.com:").expect("github repository regex is valid")
});

static GITHUB_BADGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/[^/]+/[^/]+/workflows/.*badge\.svg")
        .expect("github badge regex is valid")
});

static HTML_IMG_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("html img regex is valid")
});

/// One attribute of a start tag: name, then an optional double-quoted,
/// single-quoted or unquoted value.
static HTML_ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
    .expect("html attribute regex is valid")
});

static HTML_SVG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<svg[\s/>]").expect("html svg regex is valid"));

const GITHUB_FLAVOUR: Options = Options::ENABLE_TABLES
    .union(Options::ENABLE_STRIKETHROUGH)
    .union(Options::ENABLE_TASKLISTS);

pub fn is_github_repository(repository: &str) -> bool {
    GITHUB_REPOSITORY_RE.is_match(repository)
}

/// GitHub Actions workflow status badges.
pub fn is_github_badge(href: &str) -> bool {
    GITHUB_BADGE_RE.is_match(href)
}

pub fn is_host_trusted(url: &Url) -> bool {
    let host_trusted = url
        .host_str()
        .map(|host| TRUSTED_SVG_SOURCES.contains(&host.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    host_trusted || is_github_badge(url.as_str())
}

fn is_svg_data_url(url: &Url) -> bool {
    if !url.scheme().eq_ignore_ascii_case("data") {
        return false;
    }
    let media = url.path().to_ascii_lowercase();
    media.starts_with("image") && media.contains("/svg")
}

/// Value of the first `src` attribute in the attributes of an `<img>` tag.
/// A bare `src` yields an empty value.
fn img_src(attributes: &str) -> Option<&str> {
    HTML_ATTRIBUTE_RE
        .captures_iter(attributes)
        .find(|caps| caps[1].eq_ignore_ascii_case("src"))
        .map(|caps| {
            (2..=4)
                .find_map(|i| caps.get(i))
                .map(|m| m.as_str())
                .unwrap_or_default()
        })
}

/// Checks one image source found in `document`. The source is
/// percent-decoded before its scheme and extension are inspected.
pub fn check_image_source(document: &str, src: &str) -> Result<()> {
    let decoded = percent_decode_str(src.trim()).decode_utf8_lossy();
    let parsed = match Url::parse(&decoded) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Err(PackError::InsecureImage {
                document: document.to_string(),
                src: src.to_string(),
            })
        }
    };

    if is_svg_data_url(&parsed) {
        return Err(PackError::SvgDataUrl {
            document: document.to_string(),
            src: src.to_string(),
        });
    }
    if !parsed.scheme().eq_ignore_ascii_case("https") {
        return Err(PackError::InsecureImage {
            document: document.to_string(),
            src: src.to_string(),
        });
    }
    if parsed.path().to_ascii_lowercase().ends_with(".svg") && !is_host_trusted(&parsed) {
        return Err(PackError::UntrustedSvg {
            document: document.to_string(),
            src: src.to_string(),
        });
    }
    Ok(())
}

/// Renders `contents` as markdown and rejects unsafe images and inline SVG
/// markup, both in markdown syntax and in embedded HTML.
pub fn check_markdown(document: &str, contents: &str) -> Result<()> {
    let mut html = String::new();
    for event in Parser::new_ext(contents, GITHUB_FLAVOUR) {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => check_image_source(document, &dest_url)?,
            Event::Html(fragment) | Event::InlineHtml(fragment) => html.push_str(&fragment),
            _ => {}
        }
    }

    for tag in HTML_IMG_TAG_RE.captures_iter(&html) {
        if let Some(src) = img_src(&tag[1]) {
            check_image_source(document, src)?;
        }
    }
    if HTML_SVG_RE.is_match(&html) {
        return Err(PackError::SvgTag {
            document: document.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_hosts_and_workflow_badges() {
        let shields = Url::parse("https://IMG.SHIELDS.IO/x.svg").unwrap();
        assert!(is_host_trusted(&shields));
        let badge =
            Url::parse("https://github.com/octo/thing/workflows/CI/badge.svg").unwrap();
        assert!(is_host_trusted(&badge));
        let other = Url::parse("https://example.com/x.svg").unwrap();
        assert!(!is_host_trusted(&other));
    }

    #[test]
    fn image_sources() {
        assert!(check_image_source("README.md", "https://example.com/a.png").is_ok());
        assert!(matches!(
            check_image_source("README.md", "http://example.com/a.png"),
            Err(PackError::InsecureImage { .. })
        ));
        assert!(matches!(
            check_image_source("README.md", "data:image/svg+xml;base64,AAAA"),
            Err(PackError::SvgDataUrl { .. })
        ));
        assert!(matches!(
            check_image_source("README.md", "https://example.com/a.svg"),
            Err(PackError::UntrustedSvg { .. })
        ));
        assert!(matches!(
            check_image_source("README.md", "images/a.png"),
            Err(PackError::InsecureImage { .. })
        ));
    }

    #[test]
    fn embedded_html_is_checked() {
        let doc = "# Title\n\n<p><img alt=\"x\" src='http://example.com/a.png'></p>\n";
        assert!(matches!(
            check_markdown("README.md", doc),
            Err(PackError::InsecureImage { .. })
        ));
        let doc = "# Title\n\n<svg width=\"10\"></svg>\n";
        assert!(matches!(
            check_markdown("README.md", doc),
            Err(PackError::SvgTag { .. })
        ));
    }

    #[test]
    fn img_src_reads_every_quoting_style() {
        assert_eq!(img_src(r#" alt="a" src="x.png""#), Some("x.png"));
        assert_eq!(img_src(" src='x.png'"), Some("x.png"));
        assert_eq!(img_src(" src=x.png width=3"), Some("x.png"));
        assert_eq!(img_src(r#" data-src="a.png" SRC = "b.png""#), Some("b.png"));
        assert_eq!(img_src(r#" alt="src=c.png""#), None);
        assert_eq!(img_src(" width=3"), None);
    }

    #[test]
    fn plain_markdown_passes() {
        let doc = "# Title\n\n![logo](https://example.com/logo.png)\n\n[docs](https://example.com)\n";
        assert!(check_markdown("README.md", doc).is_ok());
    }
}
