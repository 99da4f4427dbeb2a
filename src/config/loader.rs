//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ConfigOverrides, MonitoringConfig};
use crate::config::validation::{check_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse a TOML document. Missing keys take their defaults.
pub fn parse_config(content: &str) -> Result<MonitoringConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<MonitoringConfig, ConfigError> {
    resolve_config(Some(path), ConfigOverrides::default())
}

/// The effective configuration before validation: the file (or the
/// environment when there is no file), then overrides.
pub fn read_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<MonitoringConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => MonitoringConfig::from_env(),
    };
    config.apply(overrides);
    Ok(config)
}

/// [`read_config`] followed by validation.
pub fn resolve_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<MonitoringConfig, ConfigError> {
    let config = read_config(path, overrides)?;
    check_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            environment = "staging"

            [alerting]
            enabled = true
            cooldown_minutes = 30

            [alerting.channels.webhook]
            enabled = true
            url = "https://hooks.example.com/perf"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.alerting.cooldown_minutes, 30);
        assert!(config.alerting.channels.webhook.enabled);
    }

    #[test]
    fn test_production_validation_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            environment = "production"

            [remote_logging]
            enabled = true
            "#
        )
        .unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "remote_logging.endpoint");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_and_io_errors() {
        assert!(matches!(parse_config("environment = 3"), Err(ConfigError::Parse(_))));
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn test_resolve_applies_overrides_before_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[remote_logging]\nenabled = true").unwrap();

        assert!(resolve_config(Some(file.path()), ConfigOverrides::default()).is_ok());
        let result = resolve_config(
            Some(file.path()),
            ConfigOverrides {
                environment: Some(Environment::Production),
                ..ConfigOverrides::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
