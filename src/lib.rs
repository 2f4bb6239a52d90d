pub mod archive;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod files;
pub mod ignore;
pub mod load_config;
pub mod manifest;
pub mod npm;
pub mod package;
pub mod processors;
pub mod validation;
pub mod vsix;

pub use config::{PackOptions, RepositoryPolicy};
pub use error::{PackError, Result};
pub use files::PackFile;
pub use package::{collect, list_files, ls, pack, package_command, PackResult};
