//! Layered configuration loading on figment.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. [`WorkerConfig::default`]
//! 2. `shardline.{profile}.{ext}`, then `shardline.{ext}` (or `config.*`) from
//!    the first search directory that has a main file
//! 3. `SHARDLINE_*` environment variables, `__` separating sections
//!    (`SHARDLINE_HTTP__TOKEN`, `SHARDLINE_BROKER__SHARED_QUEUE`)
//! 4. Values passed to [`ConfigLoader::merge`]
//!
//! `toml` files need the `toml-config` feature and `yaml`/`yml` files the
//! `yaml-config` feature.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().profile("production").load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::WorkerConfig;

const ENV_PREFIX: &str = "SHARDLINE_";
const PROFILE_VAR: &str = "SHARDLINE_PROFILE";
const FILE_STEMS: [&str; 2] = ["shardline", "config"];
const APP_DIR: &str = "shardline";

/// Deployment profile selecting the `shardline.{profile}.*` overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `SHARDLINE_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration file format compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
    }

    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

/// Builds a [`WorkerConfig`] from defaults, files, environment and overrides.
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
    overrides: Vec<WorkerConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Profile from `SHARDLINE_PROFILE`, environment enabled, default search
    /// paths (current directory and the user config directory).
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            env: true,
            overrides: Vec::new(),
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search. Once any is added, the defaults are not
    /// searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/shardline`.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(APP_DIR)),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` over every other source.
    pub fn merge(mut self, config: WorkerConfig) -> Self {
        self.overrides.push(config);
        self
    }

    pub fn load(self) -> ConfigResult<WorkerConfig> {
        let config: WorkerConfig = self.figment()?.extract()?;
        debug!(
            profile = %self.profile,
            logging_level = %config.logging.level,
            shared_queue = %config.broker.shared_queue,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(WorkerConfig::default()));

        figment = match &self.file {
            Some(path) => Self::explicit_file(figment, path)?,
            None => self.searched_files(figment),
        };

        if self.env {
            trace!(prefix = ENV_PREFIX, "Reading environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(self
            .overrides
            .iter()
            .fold(figment, |fig, config| fig.merge(Serialized::defaults(config))))
    }

    fn explicit_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::for_path(path).ok_or_else(|| {
            ConfigError::ParseError(format!(
                "unsupported or disabled configuration format: {}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "Loading configuration file");
        Ok(format.merge_into(figment, path))
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(APP_DIR)))
            .collect()
    }

    /// Merges the profile overlay and main file of the first directory and
    /// name that has a main file, per enabled format.
    fn searched_files(&self, mut figment: Figment) -> Figment {
        let directories = self.directories();
        let mut found = false;

        for &format in FileFormat::ENABLED {
            'search: for dir in &directories {
                for stem in FILE_STEMS {
                    for ext in format.extensions() {
                        let overlay = dir.join(format!("{stem}.{}.{ext}", self.profile));
                        if overlay.exists() {
                            debug!(path = %overlay.display(), "Loading profile configuration");
                            figment = format.merge_into(figment, &overlay);
                        }

                        let main = dir.join(format!("{stem}.{ext}"));
                        if main.exists() {
                            info!(path = %main.display(), "Loading configuration file");
                            figment = format.merge_into(figment, &main);
                            found = true;
                            break 'search;
                        }
                    }
                }
            }
        }

        if !found {
            warn!(paths = ?directories, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<WorkerConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<WorkerConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.broker.exchange, "events");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("SHARDLINE_BROKER__SHARED_QUEUE", "backup-workers");
            jail.set_env("SHARDLINE_LOGGING__LEVEL", "debug");
            jail.set_env("SHARDLINE_HTTP__MAX_ATTEMPTS", "3");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.broker.shared_queue, "backup-workers");
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.http.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_merge_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("SHARDLINE_COMMANDS__PREFIX", "env!");
            let mut overrides = WorkerConfig::default();
            overrides.commands.prefix = "x!".into();

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(overrides)
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.commands.prefix, "x!");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .file("/nonexistent/shardline.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("shardline.ini", "prefix = !")?;
            let err = ConfigLoader::new()
                .file(jail.directory().join("shardline.ini"))
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("SHARDLINE_PROFILE", "prod");
            assert_eq!(Profile::from_env(), Profile::Production);
            jail.set_env("SHARDLINE_PROFILE", "staging");
            assert_eq!(Profile::from_env().as_str(), "staging");
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_then_main_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shardline.toml",
                r#"
                [broker]
                shared_queue = "main"
                "#,
            )?;
            jail.create_file(
                "shardline.production.toml",
                r#"
                [broker]
                shared_queue = "prod"
                reconnect_delay_ms = 1000
                "#,
            )?;

            let config = ConfigLoader::new()
                .profile("production")
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.broker.shared_queue, "main");
            assert_eq!(config.broker.reconnect_delay_ms, 1000);
            Ok(())
        });
    }
}
