use crate::config::Config;
use crate::error::ConfigError;

/// Longest teardown or startup wait accepted, in seconds.
const MAX_TIMEOUT_SECS: u64 = 300;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.backend.dlv_path.as_os_str().is_empty() {
        errors.push(empty("backend.dlv_path"));
    }
    if config.build.go_path.as_os_str().is_empty() {
        errors.push(empty("build.go_path"));
    }
    if config.build.gcflags.trim().is_empty() {
        errors.push(empty("build.gcflags"));
    }

    let timeouts = [
        (
            "backend.listen_timeout_secs",
            config.backend.listen_timeout_secs,
        ),
        (
            "session.detach_timeout_secs",
            config.session.detach_timeout_secs,
        ),
        ("session.stop_timeout_secs", config.session.stop_timeout_secs),
    ];
    for (field, secs) in timeouts {
        if secs == 0 || secs > MAX_TIMEOUT_SECS {
            errors.push(ConfigError::Validation {
                field: field.to_string(),
                message: format!("must be 1\u{2013}{MAX_TIMEOUT_SECS}, got {secs}"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn empty(field: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: "must not be empty".to_string(),
    }
}
