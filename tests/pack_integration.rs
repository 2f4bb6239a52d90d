use std::fs;
use std::io::Read;
use std::path::Path;

use vsix_pack::config::{PackOptions, RepositoryPolicy};
use vsix_pack::error::PackError;
use vsix_pack::npm::{PackageManager, PackageManagerResolver};
use vsix_pack::{list_files, pack};

const MANIFEST: &str = r#"{
    "name": "thing",
    "displayName": "%displayName%",
    "publisher": "octo",
    "version": "1.0.0",
    "description": "Snippets for React",
    "license": "MIT",
    "icon": "images/icon.png",
    "engines": { "vscode": "^1.60.0" },
    "repository": { "type": "git", "url": "https://github.com/octo/thing.git" },
    "main": "./out/extension.js",
    "categories": ["Snippets"]
}"#;

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn scaffold(root: &Path) {
    write(root, "package.json", MANIFEST.as_bytes());
    write(root, "package.nls.json", br#"{"displayName": "Thing Tools"}"#);
    write(root, "README.md", b"# Thing\n\nSee [the guide](docs/guide.md). Fixes #4.\n");
    write(root, "LICENSE", b"MIT License");
    write(root, "out/extension.js", b"exports.activate = () => {};");
    write(root, "images/icon.png", &[0x89, b'P', b'N', b'G']);
    write(root, "src/extension.ts", b"export function activate() {}");
    write(root, ".vscodeignore", b"src/**\n");
}

fn options(root: &Path) -> PackOptions {
    PackOptions {
        package_manager: PackageManager::None,
        repository_policy: RepositoryPolicy::Fail,
        ..PackOptions::for_project(root)
    }
}

fn archive_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn archive_text(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut contents = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

#[tokio::test]
async fn packs_a_project_into_an_archive() {
    let project = tempfile::tempdir().unwrap();
    scaffold(project.path());

    let result = pack(&options(project.path()), &PackageManagerResolver::new())
        .await
        .unwrap();

    assert_eq!(result.package_path, project.path().join("thing-1.0.0.vsix"));
    assert_eq!(result.manifest.display_name.as_deref(), Some("Thing Tools"));

    let expected = vec![
        "extension.vsixmanifest",
        "[Content_Types].xml",
        "extension/LICENSE.txt",
        "extension/README.md",
        "extension/images/icon.png",
        "extension/out/extension.js",
        "extension/package.json",
        "extension/package.nls.json",
    ];
    assert_eq!(result.files, expected);
    assert_eq!(archive_entries(&result.package_path), expected);

    let manifest = archive_text(&result.package_path, "extension.vsixmanifest");
    assert!(manifest.contains("<DisplayName>Thing Tools</DisplayName>"));
    assert!(manifest.contains("<Tags>javascript</Tags>"));
    assert!(manifest.contains("<Categories>Snippets</Categories>"));
    assert!(manifest.contains("<License>extension/LICENSE.txt</License>"));
    assert!(manifest.contains("<Icon>extension/images/icon.png</Icon>"));
    assert!(manifest.contains(
        r#"Type="Microsoft.VisualStudio.Services.Content.Details" Path="extension/README.md""#
    ));

    let readme = archive_text(&result.package_path, "extension/README.md");
    assert!(readme.contains("(https://github.com/octo/thing/blob/master/docs/guide.md)"));
    assert!(readme.contains("[#4](https://github.com/octo/thing/issues/4)"));

    let content_types = archive_text(&result.package_path, "[Content_Types].xml");
    assert!(content_types.contains(r#"Extension=".png" ContentType="image/png""#));
    assert!(content_types.contains(r#"Extension=".txt""#));
}

#[tokio::test]
async fn repacking_replaces_the_previous_archive() {
    let project = tempfile::tempdir().unwrap();
    scaffold(project.path());
    let resolver = PackageManagerResolver::new();

    let first = pack(&options(project.path()), &resolver).await.unwrap();
    let second = pack(&options(project.path()), &resolver).await.unwrap();

    assert_eq!(first.package_path, second.package_path);
    assert_eq!(first.files, second.files);
    assert!(!second.files.iter().any(|f| f.ends_with(".vsix")));
}

#[tokio::test]
async fn output_directory_receives_the_default_name() {
    let project = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    scaffold(project.path());

    let result = pack(
        &PackOptions {
            package_path: Some(out.path().to_path_buf()),
            ..options(project.path())
        },
        &PackageManagerResolver::new(),
    )
    .await
    .unwrap();

    assert_eq!(result.package_path, out.path().join("thing-1.0.0.vsix"));
    assert!(result.package_path.is_file());
    assert!(!project.path().join("thing-1.0.0.vsix").exists());
}

#[tokio::test]
async fn failed_processing_leaves_no_archive() {
    let project = tempfile::tempdir().unwrap();
    scaffold(project.path());
    fs::remove_file(project.path().join("images/icon.png")).unwrap();

    let err = pack(&options(project.path()), &PackageManagerResolver::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PackError::IconNotFound { .. }));
    assert!(!project.path().join("thing-1.0.0.vsix").exists());
}

#[tokio::test]
async fn listing_reports_project_relative_paths() {
    let project = tempfile::tempdir().unwrap();
    scaffold(project.path());

    let files = list_files(&options(project.path()), &PackageManagerResolver::new())
        .await
        .unwrap();

    assert_eq!(
        files,
        vec![
            "LICENSE",
            "README.md",
            "images/icon.png",
            "out/extension.js",
            "package.json",
            "package.nls.json"
        ]
    );
}

#[tokio::test]
async fn missing_manifest_is_reported() {
    let project = tempfile::tempdir().unwrap();

    let err = pack(&options(project.path()), &PackageManagerResolver::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PackError::ManifestNotFound { .. }));

    let err = list_files(&options(project.path()), &PackageManagerResolver::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PackError::ManifestNotFound { .. }));
}
