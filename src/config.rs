//! Configuration for callpop.
//!
//! Settings are read from a `settings.json` file:
//!
//! | Field | Required | Default | Description |
//! |-------|----------|---------|-------------|
//! | `host` | Yes | - | AMI host to connect to |
//! | `port` | No | 5038 | AMI port |
//! | `username` | Yes | - | AMI username |
//! | `secret` | Yes | - | AMI secret |
//! | `extension` | Yes | - | Extension to watch for answered calls |
//! | `base_url` | No | `https://ticketum.bki.ir` | Ticket frontend base URL |
//! | `dept_id` | No | `"1"` | Department id placed in the ticket URL |
//! | `id_source` | No | `linkedid` | Preferred raw call id (`linkedid`/`uniqueid`) |
//! | `include_internal_calls` | No | true | Also pop for short internal numbers |
//!
//! The file is looked up next to the executable first (portable deployment),
//! then at `~/.callpop/settings.json`. When it is missing, a template is
//! written for the operator to fill in and the process exits; the daemon
//! never prompts interactively.

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::correlate::ids::IdSource;

/// Default AMI port.
const DEFAULT_PORT: u16 = 5038;

/// Default ticket frontend base URL.
const DEFAULT_BASE_URL: &str = "https://ticketum.bki.ir";

/// Default department id.
const DEFAULT_DEPT_ID: &str = "1";

/// Settings file name.
const SETTINGS_FILE: &str = "settings.json";

/// Config directory name relative to home.
const DEFAULT_CONFIG_DIR: &str = ".callpop";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file does not exist.
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    /// The settings file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON or misses a required field.
    #[error("invalid settings file: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A required field is present but empty.
    #[error("settings field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// Failed to determine the home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the callpop daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// AMI host.
    pub host: String,

    /// AMI port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// AMI username.
    pub username: String,

    /// AMI secret.
    pub secret: String,

    /// The extension answered calls are watched on.
    pub extension: String,

    /// Ticket frontend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Department id substituted into the ticket URL.
    #[serde(default = "default_dept_id")]
    pub dept_id: String,

    /// Which raw identifier the canonical call id is derived from.
    #[serde(default)]
    pub id_source: IdSource,

    /// Whether calls from short internal numbers also open a pop.
    #[serde(default = "default_true")]
    pub include_internal_calls: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_dept_id() -> String {
    DEFAULT_DEPT_ID.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads and validates the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when the file does not exist,
    /// [`ConfigError::Invalid`] for malformed JSON or missing fields, and
    /// [`ConfigError::EmptyField`] when a required field is blank.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that required fields are non-empty.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyField("host"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::EmptyField("username"));
        }
        if self.secret.trim().is_empty() {
            return Err(ConfigError::EmptyField("secret"));
        }
        if self.extension.trim().is_empty() {
            return Err(ConfigError::EmptyField("extension"));
        }
        Ok(())
    }

    /// Writes a settings template for the operator to fill in.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be written.
    pub fn write_template(path: &Path) -> Result<(), ConfigError> {
        let template = json!({
            "host": "192.168.1.20",
            "port": DEFAULT_PORT,
            "username": "",
            "secret": "",
            "extension": "",
            "base_url": DEFAULT_BASE_URL,
            "dept_id": DEFAULT_DEPT_ID,
            "id_source": "linkedid",
            "include_internal_calls": true,
        });

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut contents = serde_json::to_string_pretty(&template)?;
        contents.push('\n');
        fs::write(path, contents)?;
        Ok(())
    }

    /// Resolves the default settings path.
    ///
    /// A `settings.json` next to the executable wins (portable install);
    /// otherwise `~/.callpop/settings.json` is used.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let portable = dir.join(SETTINGS_FILE);
                if portable.exists() {
                    return Ok(portable);
                }
            }
        }

        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(base_dirs
            .home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(SETTINGS_FILE))
    }
}
