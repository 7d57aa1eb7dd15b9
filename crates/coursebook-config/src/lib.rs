use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the `chapters/` store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last edit before saving
    pub debounce_ms: u64,
    pub retry: RetryConfig,
}

/// Backoff applied when a save fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 5000,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync: SyncConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.local/share/coursebook").as_ref())
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.data_dir = Self::expand_path(&config.data_dir).unwrap_or(config.data_dir);

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    /// Load the config file, falling back to defaults when there is none
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/coursebook");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        shellexpand::full(&path_str)
            .ok()
            .map(|expanded| PathBuf::from(expanded.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let path_str = Config::config_path().to_string_lossy().into_owned();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/coursebook/config.toml"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str(r#"data_dir = "/srv/courses""#).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/courses"));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.sync.debounce_ms, 5000);
    }

    #[test]
    fn test_partial_retry_section() {
        let config: Config = toml::from_str(
            r#"
data_dir = "/srv/courses"

[sync]
debounce_ms = 750

[sync.retry]
max_attempts = 2
"#,
        )
        .unwrap();

        assert_eq!(config.sync.debounce_ms, 750);
        assert_eq!(config.sync.retry.max_attempts, 2);
        assert_eq!(config.sync.retry.initial_backoff_ms, 1000);
        assert_eq!(config.sync.retry.max_backoff_ms, 30_000);
    }

    #[test]
    fn test_expand_path_with_env_var() {
        unsafe {
            env::set_var("COURSEBOOK_TEST_ROOT", "/test/env/path");
        }

        let expanded = Config::expand_path(Path::new("$COURSEBOOK_TEST_ROOT/data")).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/env/path/data"));

        unsafe {
            env::remove_var("COURSEBOOK_TEST_ROOT");
        }
    }

    #[test]
    fn test_expand_path_leaves_plain_paths_alone() {
        for path in ["/absolute/path", "relative/path"] {
            assert_eq!(Config::expand_path(Path::new(path)), Some(PathBuf::from(path)));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = Config::load_from_path(temp_dir.path().join("nonexistent.toml")).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "sync = [").unwrap();

        let err = Config::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested/dir/config.toml");
        let config = Config {
            data_dir: PathBuf::from("/tmp/coursebook"),
            sync: SyncConfig {
                debounce_ms: 1200,
                retry: RetryConfig {
                    max_attempts: 3,
                    ..RetryConfig::default()
                },
            },
        };

        config.save_to_path(&config_file).unwrap();
        let loaded = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_tilde_in_data_dir_is_expanded_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, r#"data_dir = "~/courses""#).unwrap();

        let loaded = Config::load_from_path(&config_file).unwrap().unwrap();
        let data_dir = loaded.data_dir.to_string_lossy();

        assert!(!data_dir.starts_with('~'));
        assert!(data_dir.ends_with("courses"));
    }
}
