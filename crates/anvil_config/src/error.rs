//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating an `anvil.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// An environment override held a value that could not be interpreted.
    #[error("invalid value '{value}' for environment variable {var}")]
    InvalidEnv {
        /// The environment variable name.
        var: String,
        /// The offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("poll interval must be positive".to_string());
        assert_eq!(format!("{err}"), "validation error: poll interval must be positive");
    }

    #[test]
    fn display_invalid_env() {
        let err = ConfigError::InvalidEnv {
            var: "ANVIL_DAEMON".to_string(),
            value: "maybe".to_string(),
        };
        assert_eq!(format!("{err}"), "invalid value 'maybe' for environment variable ANVIL_DAEMON");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::IoError(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration:"));
    }
}
