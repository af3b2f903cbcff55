//! TOML-based configuration for the director.
//!
//! Reads and writes [`DirectorConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\HudDirector\director.toml`
//! - Linux:    `~/.config/hud-director/director.toml`
//! - macOS:    `~/Library/Application Support/HudDirector/director.toml`
//!
//! Example:
//!
//! ```toml
//! [connection]
//! target = "192.168.1.20:5397"
//! password = "pit wall"
//! code_width = "byte"
//! identity_check = true
//!
//! [logging]
//! level = "info"
//!
//! [layout]
//! blob_path = "layouts/broadcast.bin"
//!
//! [[widgets]]
//! name = "Speedo left"
//! type_name = "hud.widgets.SpeedoWidget"
//!
//! [[widget_states]]
//! widget_name = "(SpeedoWidget)"
//! visible_type = "NEXT_LAP"
//! visible_duration = 5000
//! ```
//!
//! Every field has a default, so a missing file or section still yields a
//! usable configuration.

use std::path::{Path, PathBuf};

use hud_core::{CodeWidth, WidgetInstance, WidgetState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level director configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectorConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Live widget instances used to expand `"(TypeName)"` wildcards.
    #[serde(default)]
    pub widgets: Vec<WidgetInstance>,
    /// Widget states loaded at start-up.
    #[serde(default)]
    pub widget_states: Vec<WidgetState>,
}

/// Where and how to connect to the plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// `host:port` of the plugin.
    #[serde(default = "default_target")]
    pub target: String,
    /// Plain-text password; only its MD5 digest is ever sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `"byte"` when talking to the standalone plugin, `"short"` when the
    /// director commands are embedded in the host protocol.
    #[serde(default = "default_code_width")]
    pub code_width: CodeWidth,
    /// Send the identity token before anything else.
    #[serde(default = "default_true")]
    pub identity_check: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Widget layout sent as WIDGETS_CONFIGURATION.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    /// File holding the serialized layout.  Without it an empty blob is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_path: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_target() -> String {
    "127.0.0.1:5397".to_string()
}
fn default_code_width() -> CodeWidth {
    CodeWidth::Byte
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            password: None,
            code_width: default_code_width(),
            identity_check: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("director.toml"))
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<DirectorConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DirectorConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads the config from the platform default location.
pub fn load_config() -> Result<DirectorConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &DirectorConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HudDirector"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hud-director"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("HudDirector")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
