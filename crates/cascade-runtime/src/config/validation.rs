//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CascadeConfig, LogLevel, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CascadeConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    if config.app.ack_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "app.ack_timeout_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    for (target, level) in &logging.filters {
        if target.is_empty() {
            return Err(ConfigError::validation("Log filter target cannot be empty"));
        }
        if !LogLevel::NAMES.contains(&level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level for `{target}`: {level}. Valid values are: {:?}",
                LogLevel::NAMES
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is `file`",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&CascadeConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_ack_timeout() {
        let mut config = CascadeConfig::default();
        config.app.ack_timeout_ms = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ack_timeout_ms"));
    }

    #[test]
    fn test_validate_invalid_filter_level() {
        let mut config = CascadeConfig::default();
        config
            .logging
            .filters
            .insert("cascade_framework".into(), "loud".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config
            .logging
            .filters
            .insert("cascade_framework".into(), "DEBUG".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = CascadeConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("cascade.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
