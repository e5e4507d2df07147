//! Configuration management for testwatch.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `testwatch.toml` file
//! 3. User config `~/.config/testwatch/config.toml`
//! 4. Built-in defaults (lowest priority)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::model::{ArtifactStrategy, SuiteSettings, TesterProfile};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Default editor not configured")]
    NoDefaultEditor,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Synchronization and output interpretation.
    pub watcher: WatcherConfig,

    /// Storage configuration.
    pub storage: StorageConfig,

    /// Editors by identifier.
    pub editors: BTreeMap<String, EditorConfig>,

    /// Tester profiles by name.
    pub testers: BTreeMap<String, TesterProfile>,

    /// Projects by name.
    pub projects: BTreeMap<String, ProjectConfig>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./testwatch.toml` (project local)
    /// 2. `~/.config/testwatch/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_file(DEFAULT_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(DEFAULT_CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TESTWATCH_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Ok(secs) = std::env::var("TESTWATCH_POLL_SECONDS") {
            if let Ok(n) = secs.parse() {
                self.watcher.poll_interval_secs = n;
            }
        }
        if let Ok(matcher) = std::env::var("TESTWATCH_FILE_MATCHER") {
            self.watcher.file_matcher = matcher;
        }
    }

    /// Checks every pattern in the configuration compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        compile_pattern("watcher.file_matcher", &self.watcher.file_matcher)?;

        for (name, tester) in &self.testers {
            if let Some(pattern) = &tester.error_pattern {
                compile_pattern(&format!("testers.{}.error_pattern", name), pattern)?;
            }
            if let ArtifactStrategy::PatternBased { pattern, .. } = &tester.artifacts {
                compile_pattern(&format!("testers.{}.artifacts.pattern", name), pattern)?;
            }
        }

        for (project, config) in &self.projects {
            for (suite, suite_config) in &config.suites {
                if let Some(mask) = &suite_config.settings.file_mask {
                    globset::Glob::new(mask).map_err(|e| {
                        ConfigError::Invalid(format!(
                            "projects.{}.suites.{}.file_mask: {}",
                            project, suite, e
                        ))
                    })?;
                }
            }
        }

        if self.editors.values().filter(|e| e.default).count() > 1 {
            return Err(ConfigError::Invalid(
                "more than one editor is marked as default".to_string(),
            ));
        }

        Ok(())
    }

    /// The editor marked `default = true`.
    pub fn default_editor(&self) -> Option<&EditorConfig> {
        self.editors.values().find(|e| e.default)
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn compile_pattern(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Invalid(format!("{}: {}", field, e)))
}

/// Synchronization and output interpretation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between synchronization passes.
    pub poll_interval_secs: u64,

    /// Path prefixes never turned into tests, for every project.
    pub exclusions: Vec<PathBuf>,

    /// Regex locating source references in tool output.
    pub file_matcher: String,

    /// Target of "open in editor" links.
    pub link_template: String,

    /// Hand eligible results to the notifier after each work cycle.
    pub notify: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            exclusions: Vec::new(),
            file_matcher: DEFAULT_FILE_MATCHER.to_string(),
            link_template: DEFAULT_LINK_TEMPLATE.to_string(),
            notify: true,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for testwatch data (default: ".testwatch").
    pub data_dir: String,

    /// Store file name.
    pub store_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            store_file: DEFAULT_STORE_FILE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Get the full path to the store file.
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.store_file)
    }
}

/// An editor invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Command template with `{file}` and `{line}` placeholders.
    pub bin: String,

    /// Used when a suite names no editor, or an unknown one.
    pub default: bool,
}

/// A project and its suites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root.
    pub path: PathBuf,

    /// Default tests directory, relative to `path`.
    pub tests_path: PathBuf,

    /// Projects whose changes also trigger this one.
    pub depends: Vec<String>,

    /// Path prefixes never turned into tests, relative to `path` or absolute.
    pub exclusions: Vec<PathBuf>,

    /// Suites by name.
    pub suites: BTreeMap<String, SuiteConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            tests_path: PathBuf::from(DEFAULT_TESTS_PATH),
            depends: Vec::new(),
            exclusions: Vec::new(),
            suites: BTreeMap::new(),
        }
    }
}

/// A suite bound to a named tester.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Name of the tester running this suite.
    pub tester: String,

    #[serde(flatten)]
    pub settings: SuiteSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.watcher.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.watcher.file_matcher, DEFAULT_FILE_MATCHER);
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[watcher]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_store_path() {
        let config = StorageConfig {
            data_dir: "/tmp/tw".to_string(),
            ..StorageConfig::default()
        };
        assert_eq!(config.store_path(), PathBuf::from("/tmp/tw/store.json"));
    }

    #[test]
    fn test_invalid_matcher_rejected() {
        let mut config = Config::default();
        config.watcher.file_matcher = "(unclosed".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_two_default_editors_rejected() {
        let mut config = Config::default();
        for name in ["vim", "code"] {
            config.editors.insert(
                name.to_string(),
                EditorConfig {
                    bin: name.to_string(),
                    default: true,
                },
            );
        }
        assert!(config.validate().is_err());
    }
}
