use crate::config::{PackOptions, RepositoryPolicy};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Environment variable overriding the configured repository policy.
pub const REPOSITORY_POLICY_ENV: &str = "VSIX_PACK_REPOSITORY_POLICY";

/// Loads pack options from a YAML file, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PackOptions> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    let options: PackOptions = serde_yaml::from_str(&config_content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML {}", path_ref.display()))?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let options = apply_env_overrides(options)?;
    options.trace_loaded();
    Ok(options)
}

/// Applies `VSIX_PACK_REPOSITORY_POLICY` when set.
pub fn apply_env_overrides(mut options: PackOptions) -> Result<PackOptions> {
    if let Ok(raw) = std::env::var(REPOSITORY_POLICY_ENV) {
        let policy: RepositoryPolicy = raw.parse().map_err(|e: String| {
            error!(var = REPOSITORY_POLICY_ENV, value = %raw, "Invalid repository policy");
            anyhow::anyhow!("{REPOSITORY_POLICY_ENV}: {e}")
        })?;
        info!(?policy, "Repository policy overridden from environment");
        options.repository_policy = policy;
    }
    Ok(options)
}
