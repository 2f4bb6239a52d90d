use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;
use crate::config::{PackOptions, RepositoryPolicy};
use crate::load_config::{apply_env_overrides, load_config};
use crate::npm::{PackageManager, PackageManagerResolver};
use crate::package::{ls, package_command};

/// CLI for vsix-pack: package editor extensions into VSIX archives.
#[derive(Parser)]
#[clap(
    name = "vsix-pack",
    version,
    about = "Package an editor extension into a VSIX archive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package the extension into a .vsix file
    Package {
        /// Output file, or a directory that receives `<name>-<version>.vsix`
        #[clap(short = 'o', long = "out")]
        out: Option<PathBuf>,
        #[clap(flatten)]
        common: CommonArgs,
    },
    /// List the files that would be packaged
    Ls {
        #[clap(flatten)]
        common: CommonArgs,
    },
}

/// Flags shared by every command. Each one overrides the config file.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Path to a YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Project directory
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    #[clap(long, value_enum)]
    pub package_manager: Option<PackageManager>,
    /// Only bundle these dependencies (and what they depend on)
    #[clap(long = "packaged-dependency")]
    pub packaged_dependencies: Vec<String>,
    /// Ignore file to use instead of .vscodeignore
    #[clap(long)]
    pub ignore_file: Option<PathBuf>,
    /// Prefix for relative links in README/CHANGELOG
    #[clap(long)]
    pub base_content_url: Option<String>,
    /// Prefix for relative images in README/CHANGELOG
    #[clap(long)]
    pub base_images_url: Option<String>,
    /// Branch used when guessing GitHub base URLs
    #[clap(long)]
    pub github_branch: Option<String>,
    /// Leave `#123` references untouched
    #[clap(long)]
    pub no_github_issue_linking: bool,
    /// Do not classify files as web resources
    #[clap(long)]
    pub no_web: bool,
    /// What to do when the manifest has no repository
    #[clap(long, value_enum)]
    pub repository_policy: Option<RepositoryPolicy>,
    /// Do not run the vscode:prepublish script
    #[clap(long)]
    pub skip_prepublish: bool,
}

impl CommonArgs {
    /// Config file (or defaults plus environment), overridden by flags.
    pub fn into_options(self) -> Result<PackOptions> {
        let mut options = match &self.config {
            Some(path) => load_config(path)?,
            None => apply_env_overrides(PackOptions::default())?,
        };
        if let Some(cwd) = self.cwd {
            options.cwd = Some(cwd);
        }
        if let Some(package_manager) = self.package_manager {
            options.package_manager = package_manager;
        }
        if !self.packaged_dependencies.is_empty() {
            options.dependency_entry_points = Some(self.packaged_dependencies);
        }
        if let Some(ignore_file) = self.ignore_file {
            options.ignore_file = Some(ignore_file);
        }
        if let Some(url) = self.base_content_url {
            options.base_content_url = Some(url);
        }
        if let Some(url) = self.base_images_url {
            options.base_images_url = Some(url);
        }
        if let Some(branch) = self.github_branch {
            options.github_branch = Some(branch);
        }
        if self.no_github_issue_linking {
            options.expand_github_issue_links = false;
        }
        if self.no_web {
            options.web = false;
        }
        if let Some(policy) = self.repository_policy {
            options.repository_policy = policy;
        }
        if self.skip_prepublish {
            options.skip_prepublish = true;
        }
        Ok(options)
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");
    let resolver = PackageManagerResolver::new();

    let result = match cli.command {
        Commands::Package { out, common } => {
            let mut options = common.into_options()?;
            if out.is_some() {
                options.package_path = out;
            }
            options.trace_loaded();
            package_command(&options, &resolver)
                .await
                .map(|_| ())
                .map_err(|e| {
                    eprintln!("[ERROR] Packaging failed: {e}");
                    anyhow::Error::new(e)
                })
        }
        Commands::Ls { common } => {
            let options = common.into_options()?;
            options.trace_loaded();
            ls(&options, &resolver).await.map(|_| ()).map_err(|e| {
                eprintln!("[ERROR] Listing failed: {e}");
                anyhow::Error::new(e)
            })
        }
    };

    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| tracing::info!(success = result.is_ok(), "vsix-pack finished"));
    result
}
