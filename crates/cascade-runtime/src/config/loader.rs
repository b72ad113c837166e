//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables `cascade.toml`
//! - `yaml-config`: enables `cascade.yaml` / `cascade.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Main config file (`cascade.toml`)
//! 3. Profile-specific overlay (`cascade.{profile}.toml`)
//! 4. Environment variables (`CASCADE_*`)
//! 5. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `CASCADE_` prefix with `__` as separator:
//!
//! - `CASCADE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `CASCADE_APP__ACK_TIMEOUT_MS=2500` → `app.ack_timeout_ms = 2500`
//! - `CASCADE_APP__IGNORE_SELF=false` → `app.ignore_self = false`
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::schema::CascadeConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
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

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `CASCADE_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("CASCADE_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path. Without any, the current directory and the user
    /// config directory are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges programmatic overrides on top of every other source.
    pub fn merge(mut self, config: CascadeConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<CascadeConfig> {
        let profile = self.profile.clone();
        let config: CascadeConfig = self.build_figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            ack_timeout_ms = config.app.ack_timeout_ms,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CascadeConfig::default()));

        match &self.config_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, path)?;
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => figment = self.load_config_files(figment),
        }

        if self.load_env {
            trace!("Loading environment variables with CASCADE_ prefix");
            figment = figment.merge(Env::prefixed("CASCADE_").split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("cascade"));
        }
        paths
    }

    /// Merges the first `cascade.*` found, then its profile overlay.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let mut extensions: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        extensions.push("toml");
        #[cfg(feature = "yaml-config")]
        extensions.extend(["yaml", "yml"]);

        for search_path in self.resolve_search_paths() {
            for ext in &extensions {
                let profile_path =
                    search_path.join(format!("cascade.{}.{ext}", self.profile.as_str()));
                let base_path = search_path.join(format!("cascade.{ext}"));
                if !base_path.exists() {
                    continue;
                }
                info!(path = %base_path.display(), "Loading configuration file");
                figment = Self::merge_file(figment, &base_path, ext);
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = Self::merge_file(figment, &profile_path, ext);
                }
                return figment;
            }
        }

        debug!("No configuration file found, using defaults");
        figment
    }

    fn merge_file(figment: Figment, path: &Path, ext: &str) -> Figment {
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            _ => figment,
        }
    }
}

/// Loads configuration from the default locations and environment.
pub fn load_config() -> ConfigResult<CascadeConfig> {
    ConfigLoader::new().load()
}
