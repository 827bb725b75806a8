//! Run configuration: an optional TOML file overlaid by command-line flags.
//!
//! The config file is optional; a missing file is an empty layer. Keys the
//! file sets that no setting reads are handed back to the caller as likely
//! typos. Both layers are merged once into an immutable [`RunConfig`] that is
//! passed by reference for the rest of the run.
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// No OPML source was given in either the config file or on the command line.
    #[error("No OPML file provided (use --opml or set `opml` in the config file)")]
    MissingOpml,

    #[error("Invalid time format: {0:?}")]
    InvalidTimeFormat(String),
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_LOG_FILE: &str = "podqueue.log";
pub const DEFAULT_DEST: &str = "output";

// ============================================================================
// Configuration Structs
// ============================================================================

/// One layer of settings, as read from the config file or the command line.
///
/// Every field is optional; `None` means "not set at this layer".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Path to the OPML subscription list, or `-` for stdin.
    pub opml: Option<PathBuf>,
    /// Destination directory for the archive.
    pub dest: Option<PathBuf>,
    /// chrono strftime pattern for episode timestamps.
    pub time_format: Option<String>,
    /// Log INFO to stderr as well as the log file.
    pub verbose: Option<bool>,
    /// Append-mode log file.
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = ["opml", "dest", "time_format", "verbose", "log_file"];

    /// Reads one settings layer from a TOML file.
    ///
    /// A missing or blank file is an empty layer. Top-level keys that no
    /// setting reads are collected into [`LoadedConfig::unknown_keys`] so the
    /// caller can report them once logging is up.
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        let Some(content) = read_capped(path, Self::MAX_FILE_SIZE)? else {
            return Ok(LoadedConfig::default());
        };
        if content.trim().is_empty() {
            return Ok(LoadedConfig::default());
        }

        let table: toml::Table = toml::from_str(&content)?;
        let unknown_keys = table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();
        let settings = toml::Value::Table(table).try_into()?;

        Ok(LoadedConfig {
            settings,
            unknown_keys,
        })
    }

    /// Layers `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: FileConfig) -> FileConfig {
        FileConfig {
            opml: other.opml.or(self.opml),
            dest: other.dest.or(self.dest),
            time_format: other.time_format.or(self.time_format),
            verbose: other.verbose.or(self.verbose),
            log_file: other.log_file.or(self.log_file),
        }
    }
}

/// A config file layer plus what was found in it but not understood.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedConfig {
    pub settings: FileConfig,
    pub unknown_keys: Vec<String>,
}

impl LoadedConfig {
    /// Emits one warning per unknown key. Call after the subscriber is installed.
    pub fn report(&self, path: &Path) {
        for key in &self.unknown_keys {
            tracing::warn!(key = %key, path = %path.display(), "Unknown key in config file, ignoring");
        }
    }
}

/// Reads `path` as UTF-8, or `None` when it does not exist.
fn read_capped(path: &Path, max: u64) -> Result<Option<String>, ConfigError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    if len > max {
        return Err(ConfigError::TooLarge(format!(
            "Config file is {} bytes (max {} bytes)",
            len, max
        )));
    }

    let mut content = String::new();
    file.take(max).read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Where the OPML document is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpmlSource {
    Path(PathBuf),
    Stdin,
}

impl From<PathBuf> for OpmlSource {
    fn from(path: PathBuf) -> Self {
        if path.as_os_str() == "-" {
            OpmlSource::Stdin
        } else {
            OpmlSource::Path(path)
        }
    }
}

/// Fully resolved, immutable settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub opml: OpmlSource,
    pub dest: PathBuf,
    pub time_format: String,
    pub verbose: bool,
    pub log_file: PathBuf,
}

impl RunConfig {
    /// Fills unset fields with defaults and validates the result.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingOpml`] when no OPML source is set
    /// - [`ConfigError::InvalidTimeFormat`] when chrono cannot render the pattern
    pub fn resolve(settings: FileConfig) -> Result<Self, ConfigError> {
        let opml: OpmlSource = settings.opml.ok_or(ConfigError::MissingOpml)?.into();

        let time_format = settings
            .time_format
            .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());
        validate_time_format(&time_format)?;

        Ok(RunConfig {
            opml,
            dest: settings.dest.unwrap_or_else(|| PathBuf::from(DEFAULT_DEST)),
            time_format,
            verbose: settings.verbose.unwrap_or(false),
            log_file: settings
                .log_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }
}

/// Rejects strftime patterns containing specifiers chrono does not know.
pub fn validate_time_format(pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidTimeFormat(pattern.to_string()));
    }
    Ok(())
}

/// Default config file location: `$XDG_CONFIG_HOME/podqueue/config.toml`,
/// falling back to `~/.config/podqueue/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("podqueue").join("config.toml"))
}

// ============================================================================
// Tests
// ============================================================================
