//! Package descriptor aggregation and template rendering.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::files::PackFile;
use crate::processors::tags::dedupe_tags;
use crate::processors::{Asset, Processor, VsixFields};

const VSIX_MANIFEST_TEMPLATE: &str = include_str!("../resources/extension.vsixmanifest");
const CONTENT_TYPES_TEMPLATE: &str = include_str!("../resources/[Content_Types].xml");

/// Content types that win over whatever the extension lookup says.
const DEFAULT_CONTENT_TYPES: &[(&str, &str)] = &[
    (".json", "application/json"),
    (".vsixmanifest", "text/xml"),
];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is valid"));

/// Merged contributions of every processor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageDescriptor {
    pub fields: VsixFields,
    pub assets: Vec<Asset>,
    /// Deduplicated, comma-joined.
    pub tags: String,
}

impl PackageDescriptor {
    /// Later processors overwrite same-named fields of earlier ones; assets
    /// are concatenated in processor order.
    pub fn from_processors<P: Processor>(processors: &[P]) -> Self {
        let mut fields = VsixFields::new();
        let mut assets = Vec::new();
        let mut tags = Vec::new();
        for processor in processors {
            fields.extend(processor.vsix());
            assets.extend(processor.assets());
            tags.extend(processor.tags());
        }
        Self {
            fields,
            assets,
            tags: dedupe_tags(tags).join(","),
        }
    }

    /// Field value as text. Missing and null fields are empty.
    pub fn text(&self, pointer: &str) -> String {
        let value = pointer
            .split('.')
            .try_fold(None::<&Value>, |current, key| {
                let next = match current {
                    None => self.fields.get(key),
                    Some(value) => value.get(key),
                };
                next.map(Some).ok_or(())
            })
            .ok()
            .flatten();
        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn present(&self, pointer: &str) -> bool {
        !self.text(pointer).is_empty()
    }
}

pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Single-pass `{{name}}` substitution. Unknown placeholders render empty.
pub fn render_template(template: &str, values: &BTreeMap<&str, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn property(id: &str, value: &str) -> String {
    format!(
        "\t\t\t<Property Id=\"{}\" Value=\"{}\" />\n",
        escape_xml(id),
        escape_xml(value)
    )
}

fn render_properties(d: &PackageDescriptor) -> String {
    let mut out = String::new();
    out.push_str(&property("Microsoft.VisualStudio.Code.Engine", &d.text("engine")));
    out.push_str(&property(
        "Microsoft.VisualStudio.Code.ExtensionDependencies",
        &d.text("extensionDependencies"),
    ));
    out.push_str(&property(
        "Microsoft.VisualStudio.Code.ExtensionPack",
        &d.text("extensionPack"),
    ));
    out.push_str(&property(
        "Microsoft.VisualStudio.Code.ExtensionKind",
        &d.text("extensionKind"),
    ));
    out.push_str(&property(
        "Microsoft.VisualStudio.Code.LocalizedLanguages",
        &d.text("localizedLanguages"),
    ));

    if d.present("links.repository") {
        let repository = d.text("links.repository");
        out.push_str(&property("Microsoft.VisualStudio.Services.Links.Source", &repository));
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.Links.Getstarted",
            &repository,
        ));
        if d.present("links.github") {
            out.push_str(&property(
                "Microsoft.VisualStudio.Services.Links.GitHub",
                &d.text("links.github"),
            ));
        } else {
            out.push_str(&property(
                "Microsoft.VisualStudio.Services.Links.Repository",
                &repository,
            ));
        }
    }
    if d.present("links.bugs") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.Links.Support",
            &d.text("links.bugs"),
        ));
    }
    if d.present("links.homepage") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.Links.Learn",
            &d.text("links.homepage"),
        ));
    }
    if d.present("galleryBanner.color") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.Branding.Color",
            &d.text("galleryBanner.color"),
        ));
    }
    if d.present("galleryBanner.theme") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.Branding.Theme",
            &d.text("galleryBanner.theme"),
        ));
    }
    out.push_str(&property(
        "Microsoft.VisualStudio.Services.GitHubFlavoredMarkdown",
        &d.text("githubMarkdown"),
    ));
    if d.present("webExtension") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Code.WebExtension",
            &d.text("webExtension"),
        ));
    }
    if let Some(Value::Bool(enabled)) = d.fields.get("enableMarketplaceQnA") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.EnableMarketplaceQnA",
            &enabled.to_string(),
        ));
    }
    if d.present("customerQnALink") {
        out.push_str(&property(
            "Microsoft.VisualStudio.Services.CustomerQnALink",
            &d.text("customerQnALink"),
        ));
    }
    out
}

fn render_badges(d: &PackageDescriptor) -> String {
    let badges = match d.fields.get("badges") {
        Some(Value::Array(badges)) if !badges.is_empty() => badges,
        _ => return String::new(),
    };
    let text = |badge: &Value, key: &str| {
        badge
            .get(key)
            .and_then(Value::as_str)
            .map(escape_xml)
            .unwrap_or_default()
    };
    let mut out = String::from("\t\t<Badges>\n");
    for badge in badges {
        out.push_str(&format!(
            "\t\t\t<Badge Link=\"{}\" ImgUri=\"{}\" Description=\"{}\" />\n",
            text(badge, "href"),
            text(badge, "url"),
            text(badge, "description"),
        ));
    }
    out.push_str("\t\t</Badges>\n");
    out
}

fn render_assets(assets: &[Asset]) -> String {
    assets
        .iter()
        .map(|asset| {
            format!(
                "\t\t<Asset Type=\"{}\" Path=\"{}\" Addressable=\"true\" />\n",
                escape_xml(&asset.asset_type),
                escape_xml(&asset.path)
            )
        })
        .collect()
}

fn optional_element(name: &str, value: String) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("\t\t<{name}>{}</{name}>\n", escape_xml(&value))
    }
}

/// Renders `extension.vsixmanifest` from the descriptor.
pub fn render_vsix_manifest(descriptor: &PackageDescriptor) -> String {
    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    for key in ["id", "version", "publisher", "displayName", "description", "categories", "flags"] {
        values.insert(key, escape_xml(&descriptor.text(key)));
    }
    values.insert("tags", escape_xml(&descriptor.tags));
    values.insert("badges", render_badges(descriptor));
    values.insert("properties", render_properties(descriptor));
    values.insert("license", optional_element("License", descriptor.text("license")));
    values.insert("icon", optional_element("Icon", descriptor.text("icon")));
    values.insert("assets", render_assets(&descriptor.assets));
    debug!(assets = descriptor.assets.len(), "Rendering package manifest");
    render_template(VSIX_MANIFEST_TEMPLATE, &values)
}

/// Distinct lower-cased extensions of `files` mapped to their content type.
pub fn content_types(files: &[PackFile]) -> BTreeMap<String, String> {
    let mut types: BTreeMap<String, String> = files
        .iter()
        .filter_map(|file| Path::new(file.path()).extension())
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            let mime = mime_guess::from_ext(&ext)
                .first_raw()
                .unwrap_or(FALLBACK_CONTENT_TYPE)
                .to_string();
            (format!(".{ext}"), mime)
        })
        .collect();
    for (ext, mime) in DEFAULT_CONTENT_TYPES {
        types.insert(ext.to_string(), mime.to_string());
    }
    types
}

/// Renders `[Content_Types].xml` for `files`.
pub fn render_content_types(files: &[PackFile]) -> String {
    let entries: String = content_types(files)
        .iter()
        .map(|(ext, mime)| {
            format!(
                "\t<Default Extension=\"{}\" ContentType=\"{}\"/>\n",
                escape_xml(ext),
                escape_xml(mime)
            )
        })
        .collect();
    let mut values = BTreeMap::new();
    values.insert("contentTypes", entries);
    render_template(CONTENT_TYPES_TEMPLATE, &values)
}
