//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic values ([`ConfigLoader::merge`])
//! 3. Profile-specific config file (`tally.{profile}.toml` / `tally.{profile}.yaml`)
//! 4. Main config file (`tally.toml`, `config.toml`, `tally.yaml`, ...)
//! 5. Environment variables (`TALLY_*`)
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML files
//! - `yaml-config`: YAML files
//!
//! # Environment Variable Mapping
//!
//! Variables use the `TALLY_` prefix with `__` separating nested keys:
//!
//! - `TALLY_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `TALLY_AGENT__INTERVAL=30s` → `agent.interval = "30s"`
//! - `TALLY_GLOBAL_TAGS__DC=east` → `global_tags.dc = "east"`
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("/etc/tally/tally.toml")
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
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::TallyConfig;

const ENV_PREFIX: &str = "TALLY_";
const PROFILE_VAR: &str = "TALLY_PROFILE";

/// Configuration profile selecting the `tally.{profile}.*` overlay file.
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

    /// Reads `TALLY_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
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

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables `TALLY_*` environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Replaces the built-in defaults; files and the environment still
    /// override these values.
    pub fn merge(mut self, config: TallyConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<TallyConfig> {
        let profile = self.profile.clone();
        let config: TallyConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            interval = %config.agent.interval,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let overrides = std::mem::take(&mut self.overrides);
        let mut figment =
            Figment::from(Serialized::defaults(TallyConfig::default())).merge(overrides);

        match &self.config_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                figment = merge_file(figment, path)?;
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => figment = self.search_files(figment),
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    fn resolved_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tally"));
        }
        paths
    }

    /// Merges the first base file found (and its profile overlay) from the
    /// enabled formats.
    #[allow(unused_mut)]
    fn search_files(&self, mut figment: Figment) -> Figment {
        let mut candidates: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        candidates.extend(["tally.toml", "config.toml"]);
        #[cfg(feature = "yaml-config")]
        candidates.extend(["tally.yaml", "tally.yml", "config.yaml", "config.yml"]);

        for dir in self.resolved_search_paths() {
            for base in &candidates {
                let base_path = dir.join(base);
                if !base_path.exists() {
                    continue;
                }
                if let Some((stem, ext)) = base.rsplit_once('.') {
                    let overlay = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if overlay.exists()
                        && let Ok(merged) = merge_file(figment.clone(), &overlay)
                    {
                        debug!(path = %overlay.display(), "Loading profile-specific config");
                        figment = merged;
                    }
                }
                info!(path = %base_path.display(), "Loading configuration file");
                if let Ok(merged) = merge_file(figment.clone(), &base_path) {
                    return merged;
                }
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Merges one file, dispatching on its extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}
