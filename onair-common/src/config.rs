//! Configuration loading and root folder resolution
//!
//! Every OnAir service resolves its root folder in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ONAIR_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the service's TOML file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is never fatal: the service logs a warning and
//! starts with built-in defaults. A TOML file that exists but does not parse
//! is reported as [`Error::Config`].

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ONAIR_ROOT_FOLDER";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was compiled for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// Resolves a service's root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    /// Create a resolver for the named module (used only for logging)
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Root folder given on the command line, if any
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder read from the TOML file, if any
    pub fn with_toml_root(mut self, path: Option<PathBuf>) -> Self {
        self.toml_root = path;
        self
    }

    /// Resolve the root folder. Never fails: the compiled default is the last resort.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                debug!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            debug!("{}: root folder from config file", self.module_name);
            return path.clone();
        }

        let fallback = CompiledDefaults::for_current_platform().root_folder;
        info!(
            "{}: no root folder configured, using default {}",
            self.module_name,
            fallback.display()
        );
        fallback
    }
}

/// Default TOML configuration path for a module: `<config_dir>/onair/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("onair").join(format!("{}.toml", module_name)))
}

/// Load a TOML configuration file into `T`
///
/// A missing file yields `T::default()` with a warning.
pub fn load_toml_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Resolve `path` against `root` unless it is already absolute
pub fn resolve_relative(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\onair
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\onair"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/onair
        dirs::data_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/onair"))
    } else {
        // ~/.local/share/onair (or /var/lib/onair for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/onair"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_keeps_absolute_paths() {
        let root = Path::new("/srv/radio");
        assert_eq!(
            resolve_relative(root, Path::new("/tmp/song.mp3")),
            PathBuf::from("/tmp/song.mp3")
        );
        assert_eq!(
            resolve_relative(root, Path::new("audio/fx")),
            PathBuf::from("/srv/radio/audio/fx")
        );
    }

    #[test]
    fn test_default_config_path_names_module() {
        if let Some(path) = default_config_path("onair-bc") {
            assert!(path.ends_with("onair/onair-bc.toml"));
        }
    }
}
