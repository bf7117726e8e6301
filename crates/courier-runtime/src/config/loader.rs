//! Layered loading of [`BotCreationOptions`] with figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: searches `courier.toml`
//! - `yaml-config`: searches `courier.yaml` and `courier.yml`
//!
//! # Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific file (`courier.{profile}.toml` / `courier.{profile}.yaml`)
//! 3. Main file (`courier.toml` / `courier.yaml` / `courier.yml`)
//! 4. Environment variables (`COURIER_*`)
//! 5. Programmatic overrides ([`ConfigLoader::merge`], [`ConfigLoader::set`])
//!
//! Files are searched in the current directory, then in
//! `<user config dir>/courier`. The first directory holding a main file wins.
//!
//! # Environment Variables
//!
//! `COURIER_` prefix, `__` separates nested keys:
//!
//! - `COURIER_TOKEN=123:abc` → `token = "123:abc"`
//! - `COURIER_DISPATCH__POLICY=sequential` → `dispatch.policy = "sequential"`
//! - `COURIER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! `COURIER_PROFILE` selects the profile and is not read as a setting.
//!
//! ```rust,ignore
//! let options = ConfigLoader::new()
//!     .profile("production")
//!     .set("log_updates", true)
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
use serde::Serialize;
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::schema::BotCreationOptions;

const ENV_PREFIX: &str = "COURIER_";
const PROFILE_VAR: &str = "COURIER_PROFILE";
const APP_DIR: &str = "courier";

/// Configuration profile for environment-specific files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name used in file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads `COURIER_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
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

/// Builds [`BotCreationOptions`] from defaults, files, environment and code.
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
    /// Programmatic layers, merged last.
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with the profile taken from the environment.
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
            overrides: Figment::new(),
        }
    }

    /// Sets the profile explicitly.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search. Replaces the default directories.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables `COURIER_*` environment variables (default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overlays a full set of options on top of every other source.
    pub fn merge(mut self, options: BotCreationOptions) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(options));
        self
    }

    /// Overrides a single key, using dotted paths for nested values.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads the options.
    ///
    /// The result is not validated; see
    /// [`validate_options`](super::validate_options).
    pub fn load(self) -> ConfigResult<BotCreationOptions> {
        let profile = self.profile.clone();
        let options: BotCreationOptions = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            logger_name = %options.logger_name,
            policy = ?options.dispatch.policy,
            "Configuration loaded"
        );
        Ok(options)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BotCreationOptions::default()));

        figment = match &self.config_file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                Self::merge_config_file(figment, path)?
            }
            None => self.load_config_files(figment),
        };

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["profile"])
                    .split("__"),
            );
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges one file, picking the provider by extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
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
            paths.push(config_dir.join(APP_DIR));
        }
        paths
    }

    /// File names to look for in each directory, in order.
    fn base_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "toml-config")]
        names.push("courier.toml");
        #[cfg(feature = "yaml-config")]
        names.extend(["courier.yaml", "courier.yml"]);
        names
    }

    /// Merges the profile file and main file of the first directory that has
    /// a main file.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let base_names = Self::base_names();

        for dir in self.resolve_search_paths() {
            let mut found = false;
            for base_name in &base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path = dir.join(format!("{stem}.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    if let Ok(merged) = Self::merge_config_file(figment.clone(), &profile_path) {
                        figment = merged;
                    }
                }

                let base_path = dir.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    if let Ok(merged) = Self::merge_config_file(figment.clone(), &base_path) {
                        figment = merged;
                    }
                    found = true;
                }
            }
            if found {
                return figment;
            }
        }

        debug!("No configuration file found, using defaults");
        figment
    }
}

/// Loads options from the default locations.
pub fn load_options() -> ConfigResult<BotCreationOptions> {
    ConfigLoader::new().load()
}

/// Loads options from one file plus environment variables.
pub fn load_options_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BotCreationOptions> {
    ConfigLoader::new().file(path).load()
}
