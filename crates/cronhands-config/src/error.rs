//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `${VAR}` without a default and `VAR` unset.
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_shows_path() {
        let err = ConfigError::NotFound(PathBuf::from("/etc/cronhands/cronhands.toml"));
        assert_eq!(
            err.to_string(),
            "Config file not found: /etc/cronhands/cronhands.toml"
        );
    }

    #[test]
    fn test_read_error_keeps_source() {
        let err = ConfigError::Read {
            path: PathBuf::from("cronhands.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("cronhands.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_env_var_not_set() {
        let err = ConfigError::EnvVarNotSet("LOG_DIR".to_string());
        assert!(err.to_string().contains("LOG_DIR"));
    }

    #[test]
    fn test_parse_error_from_toml() {
        let err: ConfigError = toml::from_str::<toml::Table>("[paths").unwrap_err().into();
        assert!(err.to_string().starts_with("Invalid TOML"));
    }
}
