//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap());

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut missing = None;
        let expanded = ENV_VAR.replace_all(content, |cap: &regex::Captures<'_>| {
            match (std::env::var(&cap[1]), cap.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    missing.get_or_insert_with(|| cap[1].to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarNotSet(var)),
            None => Ok(expanded.into_owned()),
        }
    }

    fn expand_paths(config: &mut Config) {
        let expand = |p: &mut PathBuf| *p = Self::expand_path_buf(p);

        expand(&mut config.paths.log_dir);
        expand(&mut config.paths.state_dir);
        if let Some(dir) = config.health.output_dir.as_mut() {
            expand(dir);
        }
        for job in &mut config.jobs {
            if let Some(dir) = job.working_dir.as_mut() {
                expand(dir);
            }
            if let Some(dir) = job.sweep.as_mut().and_then(|s| s.directory.as_mut()) {
                expand(dir);
            }
        }
    }

    fn expand_path_buf(path: &Path) -> PathBuf {
        match path.to_str() {
            Some(s) => PathBuf::from(Self::expand_path(s)),
            None => path.to_path_buf(),
        }
    }

    /// Expand shell-style paths (e.g., `~/logs`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.paths.log_dir, PathBuf::from("/app/logs"));
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_load_jobs() {
        let content = r#"
            [paths]
            log_dir = "/var/log/scrape"

            [[jobs]]
            name = "scraper"
            schedule = "0 8 * * *"
            command = "python scraper.py"
            working_dir = "/app"
            env = { HEADLESS = "1" }

            [[jobs]]
            name = "cleanup"
            schedule = "0 3 * * *"
            [jobs.sweep]
            max_age_days = 7
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].command.as_deref(), Some("python scraper.py"));
        assert_eq!(config.jobs[0].env["HEADLESS"], "1");
        assert_eq!(config.jobs[1].sweep.as_ref().unwrap().max_age_days, 7);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]").unwrap();
        writeln!(file, "kill_grace_secs = 3").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.daemon.kill_grace_secs, 3);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/cronhands.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("jobs = [unclosed");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: unique test-only variable
        unsafe {
            std::env::set_var("CRONHANDS_TEST_LOG_DIR", "/tmp/scrape-logs");
        }
        let content = "log_dir = \"${CRONHANDS_TEST_LOG_DIR}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, "log_dir = \"/tmp/scrape-logs\"");
        unsafe {
            std::env::remove_var("CRONHANDS_TEST_LOG_DIR");
        }
    }

    #[test]
    fn test_expand_env_vars_default() {
        let content = "level = \"${CRONHANDS_TEST_UNSET_LEVEL:-debug}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, "level = \"debug\"");
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_TEST_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(v)) if v == "NONEXISTENT_TEST_VAR_12345"));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_paths_tilde_expanded() {
        let content = r#"
            [paths]
            log_dir = "~/cronhands/logs"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        let log_dir = config.paths.log_dir.to_string_lossy().to_string();
        assert!(!log_dir.starts_with('~'));
        assert!(log_dir.ends_with("/cronhands/logs"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        assert_eq!(ConfigLoader::expand_path("/usr/local/bin"), "/usr/local/bin");
    }
}
