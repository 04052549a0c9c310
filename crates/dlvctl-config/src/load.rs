use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# dlvctl configuration
# Uncomment and edit settings below to override defaults.

# [backend]
# dlv_path = "dlv"
# listen_timeout_secs = 10

# [build]
# go_path = "go"
# gcflags = "all=-N -l"

# [session]
# detach_timeout_secs = 5
# stop_timeout_secs = 5

# [log]
# level = "info"
# file = "/tmp/dlvctl.log"
"#;

/// Directory name of the per-project overlay.
const PROJECT_DIR: &str = ".dlvctl";

/// Resolve the global configuration directory.
///
/// `$DLVCTL_CONFIG_DIR` wins, then `$XDG_CONFIG_HOME/dlvctl`, then
/// `$HOME/.config/dlvctl`. Falls back to `./.dlvctl` when none is set.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("DLVCTL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dlvctl");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("dlvctl");
    }
    PathBuf::from(PROJECT_DIR)
}

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`, creating it
///    with commented-out defaults when missing.
/// 2. Optionally reads a project config from `.dlvctl/config.toml`,
///    walking upward from `project_dir`.
/// 3. Merges: `Config::default() <- global <- project`.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("Merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    validate(&config).map_err(first_error)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config).map_err(first_error)?;
    Ok(config)
}

fn first_error(errors: Vec<ConfigError>) -> ConfigError {
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| ConfigError::Validation {
            field: "unknown".to_string(),
            message: "validation failed".to_string(),
        })
}

/// Walk from `start` upward looking for `.dlvctl/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join("config.toml"))
        .find(|candidate| candidate.exists())
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
