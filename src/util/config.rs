//! Configuration file support.
//!
//! Two configuration file locations are consulted:
//! - Global: `~/.biscuit/config.toml` - User-wide defaults
//! - Project: `<source>/.biscuit/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the per-user and per-project configuration directory.
pub const CONFIG_DIR_NAME: &str = ".biscuit";

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Compiler and nested-build tool overrides
    pub toolchain: ToolchainSettings,

    /// Verification tool lookup
    pub tools: ToolsConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Default build profile when none is given on the command line
    pub profile: Option<String>,
}

/// Toolchain overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Path to the C++ compiler (e.g., /usr/bin/clang++)
    pub cxx: Option<PathBuf>,

    /// Path to the archiver (e.g., /usr/bin/llvm-ar)
    pub ar: Option<PathBuf>,

    /// Path to cmake, used for nested framework builds
    pub cmake: Option<PathBuf>,
}

/// Where and under which names verification tools are looked up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Extra directories searched before the built-in locations
    pub search_dirs: Vec<PathBuf>,

    /// Also search the directories in PATH (default: true)
    pub system_path: Option<bool>,

    /// Accepted formatter names, most preferred first
    pub formatter: Vec<String>,

    /// Accepted static analyzer names, most preferred first
    pub analyzer: Vec<String>,

    /// Accepted lint script names, most preferred first
    pub lint: Vec<String>,
}

impl ToolsConfig {
    pub fn use_system_path(&self) -> bool {
        self.system_path.unwrap_or(true)
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.profile.is_some() {
            self.build.profile = other.build.profile;
        }

        if other.toolchain.cxx.is_some() {
            self.toolchain.cxx = other.toolchain.cxx;
        }
        if other.toolchain.ar.is_some() {
            self.toolchain.ar = other.toolchain.ar;
        }
        if other.toolchain.cmake.is_some() {
            self.toolchain.cmake = other.toolchain.cmake;
        }

        // Search dirs accumulate; the overriding file's dirs are searched first
        if !other.tools.search_dirs.is_empty() {
            let mut dirs = other.tools.search_dirs;
            dirs.append(&mut self.tools.search_dirs);
            self.tools.search_dirs = dirs;
        }
        if other.tools.system_path.is_some() {
            self.tools.system_path = other.tools.system_path;
        }
        if !other.tools.formatter.is_empty() {
            self.tools.formatter = other.tools.formatter;
        }
        if !other.tools.analyzer.is_empty() {
            self.tools.analyzer = other.tools.analyzer;
        }
        if !other.tools.lint.is_empty() {
            self.tools.lint = other.tools.lint;
        }
    }
}

/// Get the global config directory (~/.biscuit).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR_NAME))
}

/// Get the global config path (~/.biscuit/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (<source>/.biscuit/config.toml).
pub fn project_config_path(source_root: &Path) -> PathBuf {
    source_root.join(CONFIG_DIR_NAME).join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.biscuit/config.toml)
/// 2. Global config (~/.biscuit/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Load the configuration that applies to a source tree.
pub fn load_for_source(source_root: &Path) -> Config {
    let global = global_config_path();
    load_config(global.as_deref(), &project_config_path(source_root))
}
