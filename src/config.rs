//! Configuration and directory layout
//!
//! Settings live in `config.toml` in the platform config directory, e.g.
//! `~/.config/prevodi/config.toml` on Linux. A default file is written on
//! first use so there is something to edit.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::SITE_URL;

/// Errors that can occur while loading or saving the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform has no home directory to derive paths from
    #[error("Failed to determine configuration directory location")]
    DirectoryNotFound,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings loaded from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Forum user name
    pub username: String,
    /// Forum password
    pub password: String,
    /// Subtitle languages to offer, by name (e.g. "Croatian")
    pub languages: Vec<String>,
    /// Site location, mainly overridden for testing
    pub site_url: String,
    /// Age in days after which cached subtitles are removed, 0 keeps them forever
    pub cache_max_age_days: u64,
    /// Use this unrar executable instead of downloading one
    pub unrar_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            languages: vec!["Croatian".to_string(), "English".to_string()],
            site_url: SITE_URL.to_string(),
            cache_max_age_days: 3,
            unrar_path: None,
        }
    }
}

impl Config {
    /// Returns the cache age limit, `None` when sweeping is disabled
    pub fn cache_max_age(&self) -> Option<Duration> {
        match self.cache_max_age_days {
            0 => None,
            days => Some(Duration::from_secs(days * 24 * 60 * 60)),
        }
    }

    /// Loads the configuration from the default location
    pub fn load_or_init() -> Result<Self, ConfigError> {
        Self::load_or_init_at(&config_path()?)
    }

    /// Loads the configuration from `path`, writing defaults if it does not exist
    pub fn load_or_init_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("created default config at {}", path.display());
            return Ok(config);
        }

        let data = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Writes the configuration to `path`
    ///
    /// Used to remember credentials entered after a failed login.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, toml::to_string_pretty(self)?).map_err(io_error)
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("org", "prijevodi-online", "prevodi").ok_or(ConfigError::DirectoryNotFound)
}

/// Location of `config.toml`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Directories the application writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// Per-episode subtitle cache
    pub cache: PathBuf,
    /// Downloaded unrar executables
    pub unrar: PathBuf,
    /// Subtitles handed over to the player; wiped on every start
    pub temp: PathBuf,
    /// Log files
    pub logs: PathBuf,
}

impl AppDirs {
    /// Platform specific locations:
    /// - Linux: ~/.cache/prevodi/, ~/.local/share/prevodi/, ~/.local/state/prevodi/
    /// - macOS: ~/Library/Caches/org.prijevodi-online.prevodi/, ...
    /// - Windows: %LOCALAPPDATA%\prijevodi-online\prevodi\
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = project_dirs()?;
        let logs = dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.data_local_dir().join("logs"));

        Ok(Self {
            cache: dirs.cache_dir().join("subtitles"),
            unrar: dirs.data_local_dir().join("unrar"),
            temp: dirs.cache_dir().join("temp"),
            logs,
        })
    }

    /// All directories below `root`
    pub fn under(root: &Path) -> Self {
        Self {
            cache: root.join("cache"),
            unrar: root.join("unrar"),
            temp: root.join("temp"),
            logs: root.join("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.site_url, "https://www.prijevodi-online.org");
        assert_eq!(cfg.cache_max_age_days, 3);
        assert_eq!(cfg.cache_max_age(), Some(Duration::from_secs(3 * 86400)));
        assert!(cfg.username.is_empty());
        assert!(cfg.unrar_path.is_none());
    }

    #[test]
    fn config_toml_partial_file() {
        let toml = r#"
            username = "gost"
            password = "tajna"
            languages = ["Serbian", "Bosnian"]
            cache_max_age_days = 0
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.username, "gost");
        assert_eq!(cfg.languages, vec!["Serbian", "Bosnian"]);
        assert_eq!(cfg.site_url, SITE_URL);
        assert_eq!(cfg.cache_max_age(), None);
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = Config::load_or_init_at(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.username = "korisnik".to_string();
        changed.save(&path).unwrap();
        assert_eq!(Config::load_or_init_at(&path).unwrap(), changed);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "languages = 5").unwrap();

        assert!(matches!(
            Config::load_or_init_at(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn app_dirs_under_root() {
        let dirs = AppDirs::under(Path::new("/tmp/prevodi"));
        assert_eq!(dirs.cache, PathBuf::from("/tmp/prevodi/cache"));
        assert_eq!(dirs.temp, PathBuf::from("/tmp/prevodi/temp"));
    }
}
