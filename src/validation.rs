//! Field-level manifest validation.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::error::{PackError, Result};
use crate::manifest::Manifest;
use crate::processors::content_safety::is_host_trusted;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9][a-z0-9\-]*$").expect("name regex is valid"));

static ENGINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*$|^(\^|>=)?((\d+)|x)\.((\d+)|x)\.((\d+)|x)(-.*)?$")
        .expect("engine regex is valid")
});

static MAJOR_MINOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D*(\d+)\.(\d+)").expect("major.minor regex is valid"));

pub fn validate_publisher(publisher: &str) -> Result<()> {
    if publisher.is_empty() {
        return Err(PackError::MissingField { field: "publisher" });
    }
    if !NAME_RE.is_match(publisher) {
        return Err(PackError::InvalidField {
            field: "publisher",
            reason: format!("'{publisher}' must match {}", NAME_RE.as_str()),
        });
    }
    Ok(())
}

pub fn validate_extension_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PackError::MissingField { field: "name" });
    }
    if !NAME_RE.is_match(name) {
        return Err(PackError::InvalidField {
            field: "name",
            reason: format!("'{name}' must match {}", NAME_RE.as_str()),
        });
    }
    Ok(())
}

pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(PackError::MissingField { field: "version" });
    }
    semver::Version::parse(version).map_err(|e| PackError::InvalidField {
        field: "version",
        reason: format!("'{version}' is not a valid semantic version ({e})"),
    })?;
    Ok(())
}

pub fn validate_engine_compatibility(engine: &str) -> Result<()> {
    if !ENGINE_RE.is_match(engine) {
        return Err(PackError::InvalidField {
            field: "engines.vscode",
            reason: format!("invalid compatibility range '{engine}'"),
        });
    }
    Ok(())
}

fn major_minor(range: &str) -> Option<(u64, u64)> {
    let caps = MAJOR_MINOR_RE.captures(range)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// The type declarations may not describe a newer API than the engine
/// range promises. Wildcard engines accept anything.
pub fn validate_types_compatibility(engine: &str, types: &str) -> Result<()> {
    if engine == "*" {
        return Ok(());
    }
    let (Some(engine_version), Some(types_version)) = (major_minor(engine), major_minor(types))
    else {
        return Err(PackError::InvalidField {
            field: "devDependencies.@types/vscode",
            reason: format!("could not compare '{types}' with engine '{engine}'"),
        });
    };
    if types_version > engine_version {
        return Err(PackError::InvalidField {
            field: "devDependencies.@types/vscode",
            reason: format!(
                "@types/vscode {types} is greater than engines.vscode {engine}. Either upgrade \
                 engines.vscode or use an older @types/vscode version"
            ),
        });
    }
    Ok(())
}

/// Badge images must be served over HTTPS, and SVG badges only from
/// trusted hosts.
pub fn validate_badge_url(badge_url: &str) -> Result<()> {
    let decoded = percent_decode_str(badge_url).decode_utf8_lossy();
    let parsed = Url::parse(&decoded).map_err(|_| PackError::InsecureBadge {
        url: badge_url.to_string(),
    })?;
    if !parsed.scheme().eq_ignore_ascii_case("https") {
        return Err(PackError::InsecureBadge {
            url: badge_url.to_string(),
        });
    }
    if parsed.path().to_ascii_lowercase().ends_with(".svg") && !is_host_trusted(&parsed) {
        return Err(PackError::UntrustedBadgeSvg {
            url: badge_url.to_string(),
        });
    }
    Ok(())
}

pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    validate_publisher(&manifest.publisher)?;
    validate_extension_name(&manifest.name)?;
    validate_version(&manifest.version)?;

    let engines = manifest
        .engines
        .as_ref()
        .ok_or(PackError::MissingField { field: "engines" })?;
    let engine = engines
        .get("vscode")
        .ok_or(PackError::MissingField {
            field: "engines.vscode",
        })?;
    validate_engine_compatibility(engine)?;

    if let Some(types) = manifest.dev_dependencies.get("@types/vscode") {
        validate_types_compatibility(engine, types)?;
    }

    if let Some(icon) = &manifest.icon {
        if icon.to_ascii_lowercase().ends_with(".svg") {
            return Err(PackError::InvalidField {
                field: "icon",
                reason: format!("SVGs can't be used as icons: {icon}"),
            });
        }
    }

    for badge in &manifest.badges {
        validate_badge_url(&badge.url)?;
    }

    if manifest.dependencies.contains_key("vscode") {
        return Err(PackError::InvalidField {
            field: "dependencies",
            reason: "you should not depend on 'vscode' in your 'dependencies'. Did you mean to add \
                     it to 'devDependencies'?"
                .to_string(),
        });
    }
    Ok(())
}
