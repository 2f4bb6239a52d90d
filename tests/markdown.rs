use serde_json::{json, Value};

use vsix_pack::config::PackOptions;
use vsix_pack::error::PackError;
use vsix_pack::files::PackFile;
use vsix_pack::manifest::Manifest;
use vsix_pack::processors::markdown::{MarkdownProcessor, CHANGELOG_ASSET, DETAILS_ASSET};
use vsix_pack::processors::Processor;

fn manifest(repository: Value) -> Manifest {
    Manifest::from_value(json!({
        "name": "thing",
        "publisher": "octo",
        "version": "1.0.0",
        "repository": repository
    }))
    .unwrap()
}

fn github_readme() -> MarkdownProcessor {
    MarkdownProcessor::readme(
        &manifest(json!({"type": "git", "url": "https://github.com/octo/thing.git"})),
        &PackOptions::default(),
    )
}

#[test]
fn relative_links_are_rewritten_against_the_repository() {
    let out = github_readme()
        .rewrite("See [the guide](docs/guide.md) and ![logo](./images/logo.png).\n")
        .unwrap();
    assert_eq!(
        out,
        "See [the guide](https://github.com/octo/thing/blob/master/docs/guide.md) and \
         ![logo](https://github.com/octo/thing/raw/master/images/logo.png).\n"
    );
}

#[test]
fn branch_option_changes_the_guessed_urls() {
    let processor = MarkdownProcessor::readme(
        &manifest(json!("https://github.com/octo/thing")),
        &PackOptions {
            github_branch: Some("main".to_string()),
            ..PackOptions::default()
        },
    );
    let out = processor.rewrite("[a](a.md)").unwrap();
    assert_eq!(out, "[a](https://github.com/octo/thing/blob/main/a.md)");
}

#[test]
fn linked_badges_are_rewritten_inside_and_out() {
    let out = github_readme()
        .rewrite("[![build](badge.png)](ci/status.md)")
        .unwrap();
    assert_eq!(
        out,
        "[![build](https://github.com/octo/thing/raw/master/badge.png)]\
         (https://github.com/octo/thing/blob/master/ci/status.md)"
    );
}

#[test]
fn html_images_use_the_images_base() {
    let out = github_readme()
        .rewrite("<img alt=\"shot\" src=\"media/shot.png\">\n")
        .unwrap();
    assert!(out.contains("src=\"https://github.com/octo/thing/raw/master/media/shot.png\""));
}

#[test]
fn relative_image_without_base_fails() {
    let processor = MarkdownProcessor::readme(&manifest(Value::Null), &PackOptions::default());
    let err = processor.rewrite("![logo](images/logo.png)").unwrap_err();
    match err {
        PackError::RelativeLinkWithoutRepository { document, kind, link } => {
            assert_eq!(document, "README.md");
            assert_eq!(kind, "image");
            assert_eq!(link, "images/logo.png");
        }
        other => panic!("expected a missing base error, got {other:?}"),
    }
}

#[test]
fn explicit_base_content_url_serves_links_and_images() {
    let processor = MarkdownProcessor::readme(
        &manifest(Value::Null),
        &PackOptions {
            base_content_url: Some("https://cdn.example.com/docs/".to_string()),
            ..PackOptions::default()
        },
    );
    let out = processor.rewrite("[a](/a.md) ![b](b.png)").unwrap();
    assert_eq!(
        out,
        "[a](https://cdn.example.com/docs/a.md) ![b](https://cdn.example.com/docs/b.png)"
    );
}

#[test]
fn absolute_links_and_anchors_are_left_alone() {
    let input = "[home](https://example.com/x) [top](#install) [mail](mailto:me@example.com)";
    let processor = MarkdownProcessor::readme(&manifest(Value::Null), &PackOptions::default());
    assert_eq!(processor.rewrite(input).unwrap(), input);
}

#[test]
fn rewriting_twice_changes_nothing() {
    let processor = github_readme();
    let once = processor
        .rewrite("Fixed #7. See [guide](docs/guide.md) and ![x](x.png).\n")
        .unwrap();
    assert_eq!(processor.rewrite(&once).unwrap(), once);
}

#[test]
fn issue_references_expand_to_links() {
    let out = github_readme()
        .rewrite("Fixed #12 and other/repo#3.\n")
        .unwrap();
    assert_eq!(
        out,
        "Fixed [#12](https://github.com/octo/thing/issues/12) and \
         [other/repo#3](https://github.com/other/repo/issues/3).\n"
    );
}

#[test]
fn issue_expansion_can_be_disabled() {
    let processor = MarkdownProcessor::readme(
        &manifest(json!("https://github.com/octo/thing")),
        &PackOptions {
            expand_github_issue_links: false,
            ..PackOptions::default()
        },
    );
    assert_eq!(processor.rewrite("Fixed #12.").unwrap(), "Fixed #12.");
}

#[test]
fn issues_are_not_expanded_for_other_hosts() {
    let processor = MarkdownProcessor::readme(
        &manifest(json!("https://gitlab.com/octo/thing")),
        &PackOptions {
            base_content_url: Some("https://gitlab.com/octo/thing/-/raw/main".to_string()),
            ..PackOptions::default()
        },
    );
    assert_eq!(processor.rewrite("Fixed #12.").unwrap(), "Fixed #12.");
}

#[test]
fn template_boilerplate_is_rejected() {
    let err = github_readme()
        .rewrite("# thing\n\nThis is the README for your extension \"thing\".\n")
        .unwrap_err();
    assert!(matches!(err, PackError::UnexpandedReadme { .. }));
}

#[test]
fn unsafe_images_are_rejected() {
    let processor = github_readme();
    assert!(matches!(
        processor.rewrite("![x](http://example.com/a.png)"),
        Err(PackError::InsecureImage { .. })
    ));
    assert!(matches!(
        processor.rewrite("![x](https://example.com/a.svg)"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(matches!(
        processor.rewrite("<img src=\"data:image/svg+xml;base64,AAAA\">"),
        Err(PackError::SvgDataUrl { .. })
    ));
    assert!(matches!(
        processor.rewrite("# t\n\n<svg width=\"4\"></svg>\n"),
        Err(PackError::SvgTag { .. })
    ));
    assert!(processor
        .rewrite("![build](https://img.shields.io/badge/build-passing-green.svg)")
        .is_ok());
}

#[test]
fn encoded_and_uppercase_svg_paths_are_still_svg() {
    let processor = github_readme();
    assert!(matches!(
        processor.rewrite("![x](https://evil.example/a%2Esvg)\n"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(matches!(
        processor.rewrite("![x](https://evil.example/a%2esvg)\n"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(matches!(
        processor.rewrite("![x](https://evil.example/LOGO.SVG)\n"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(matches!(
        processor.rewrite("<img src=\"https://evil.example/a%2Esvg\">\n"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(processor
        .rewrite("![x](https://img.shields.io/badge/a%2Esvg)\n")
        .is_ok());
}

#[test]
fn every_img_tag_src_is_checked_whatever_its_quoting() {
    let processor = github_readme();
    assert!(matches!(
        processor.rewrite("<img src=http://example.com/a.png>\n"),
        Err(PackError::InsecureImage { .. })
    ));
    assert!(matches!(
        processor.rewrite(
            "<img data-src=\"https://example.com/ok.png\" src=\"http://example.com/a.png\">\n"
        ),
        Err(PackError::InsecureImage { .. })
    ));
    assert!(matches!(
        processor.rewrite(
            "<p><img src=\"https://example.com/ok.png\"> <img src='http://example.com/a.png'></p>\n"
        ),
        Err(PackError::InsecureImage { .. })
    ));
    assert!(matches!(
        processor.rewrite("<img alt=\"a > b\" src=https://evil.example/a.SVG>\n"),
        Err(PackError::UntrustedSvg { .. })
    ));
    assert!(processor
        .rewrite("<img data-src=\"http://example.com/lazy.png\" src=\"https://example.com/a.png\">\n")
        .is_ok());
}

#[tokio::test]
async fn readme_is_replaced_in_memory_and_recorded() {
    let processor = github_readme();
    let readme = PackFile::in_memory("extension/Readme.md", b"[a](a.md)".to_vec());

    let out = processor.on_file(readme).await.unwrap();
    assert!(out.is_in_memory());
    assert_eq!(out.path(), "extension/Readme.md");
    assert_eq!(
        out.read_to_string().await.unwrap(),
        "[a](https://github.com/octo/thing/blob/master/a.md)"
    );

    let other = PackFile::in_memory("extension/docs/README.md", b"[a](a.md)".to_vec());
    let untouched = processor.on_file(other).await.unwrap();
    assert_eq!(untouched.read_to_string().await.unwrap(), "[a](a.md)");

    let assets = processor.assets();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].asset_type, DETAILS_ASSET);
    assert_eq!(assets[0].path, "extension/Readme.md");
}

#[tokio::test]
async fn changelog_is_recorded_under_its_own_asset_type() {
    let processor = MarkdownProcessor::changelog(
        &manifest(json!("https://github.com/octo/thing")),
        &PackOptions::default(),
    );
    assert_eq!(processor.name(), "CHANGELOG.md");
    let changelog = PackFile::in_memory("extension/CHANGELOG.md", b"## 1.0.0\n".to_vec());
    processor.on_file(changelog).await.unwrap();

    let assets = processor.assets();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].asset_type, CHANGELOG_ASSET);
}
