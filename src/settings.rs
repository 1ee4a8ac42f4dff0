use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Deserialize;
use thiserror::Error;

pub const APP_DIR_NAME: &str = "cliphome";
const DB_FILE_NAME: &str = "cliphome.db";
const SETTINGS_FILE_NAME: &str = "config.json";

pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_MAX_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// User-tunable options, read from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run the retention policy when the daemon starts.
    pub clean_up: bool,
    /// Age limit in days; when positive it replaces size-based trimming.
    pub ttl: i64,
    pub max_size: i64,
    /// Entries kept after size-based trimming, and the browse page size.
    pub limit: i64,
    pub use_xclip: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clean_up: false,
            ttl: 0,
            max_size: DEFAULT_MAX_SIZE as i64,
            limit: DEFAULT_LIMIT as i64,
            use_xclip: true,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults on any problem.
    ///
    /// A missing file is silent; an unreadable or malformed one is logged.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(err) => {
                warn!("{err}; using default settings");
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Browse page size: a positive CLI value wins, then a positive `limit`.
    pub fn page_size(&self, cli_override: Option<usize>) -> usize {
        match cli_override {
            Some(limit) if limit > 0 => limit,
            _ => positive_or(self.limit, DEFAULT_LIMIT),
        }
    }
}

pub(crate) fn positive_or(value: i64, fallback: usize) -> usize {
    if value > 0 {
        usize::try_from(value).unwrap_or(fallback)
    } else {
        fallback
    }
}

/// Filesystem locations, resolved once at startup and passed down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Result<Self> {
        let paths = Self::from_env(std::env::var_os("XDG_CONFIG_HOME"), dirs::home_dir())?;
        fs::create_dir_all(&paths.config_dir).with_context(|| {
            format!(
                "failed to create config directory {}",
                paths.config_dir.display()
            )
        })?;
        Ok(paths)
    }

    /// `$XDG_CONFIG_HOME/cliphome`, else `~/.config/cliphome`.
    pub fn from_env(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Result<Self> {
        let root = match xdg_config_home.filter(|value| !value.is_empty()) {
            Some(xdg) => PathBuf::from(xdg),
            None => home
                .ok_or_else(|| anyhow!("failed to determine the user home directory"))?
                .join(".config"),
        };

        Ok(Self {
            config_dir: root.join(APP_DIR_NAME),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.config_dir.join(DB_FILE_NAME)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }
}
