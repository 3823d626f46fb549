//! prevodi - Subtitles from prijevodi-online.org
//!
//! This library logs into prijevodi-online.org, finds the subtitles of a TV
//! episode, downloads the chosen archive and unpacks it next to the name of
//! the video, so the player picks the subtitle up.

pub mod archive;
mod cache;
pub mod client;
pub mod config;
mod file_operations;
mod handler;
pub mod languages;
pub mod logging;
pub mod params;
pub mod scrape;

// Re-export error types
pub use archive::ArchiveError;
pub use archive::unrar::UnrarError;
pub use cache::CacheError;
pub use client::PrevodiError;
pub use config::ConfigError;
pub use file_operations::FileOperationError;
pub use scrape::ScrapeError;

pub use archive::Archive;
pub use archive::unrar::UnrarTool;
pub use cache::CacheStorage;
pub use client::{Credentials, Prevodi};
pub use config::{AppDirs, Config};
pub use handler::{ADDON_ID, ActionHandler, DirectoryEntry, MediaInfo};
pub use params::{Action, Params};

// Re-export file operations
pub use file_operations::{
    dashify, execute_copy, execute_rename, possible_subtitles, sanitize_filename,
    subtitle_candidate,
};

use std::path::PathBuf;
use thiserror::Error;

/// Progress event emitted while an action runs
///
/// These events allow library users to track progress and provide feedback
/// while the site is queried.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Logging into the forum
    LoggingIn { username: String },

    /// Archive listing found in the episode cache
    LoadedFromCache { cache_dir: PathBuf },

    /// Searching the site for a show
    SearchingShow { title: String },

    /// Show page loaded
    ShowSelected { title: String, season_count: usize },

    /// Archives of the episode listed
    SubtitlesListed { total: usize, matching: usize },

    /// A previously downloaded subtitle is reused
    UsingCachedSubtitle { path: PathBuf },

    /// Downloading a subtitle archive
    DownloadingArchive { url: String },

    /// Extracting a subtitle from the archive
    Extracting { archive: PathBuf, member: String },

    /// Action complete
    Complete { entry_count: usize },
}

/// Top-level error type for prevodi operations
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No username or password configured
    #[error("Username and password are required")]
    MissingCredentials,

    /// The requested action does not exist
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    /// A query parameter the action needs is missing
    #[error("Missing parameter '{0}'")]
    MissingParameter(&'static str),

    /// Error while talking to the site
    #[error("Site error: {0}")]
    Prevodi(#[from] PrevodiError),

    /// Error while unpacking a subtitle archive
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error during cache operations
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error while naming or copying subtitle files
    #[error("File operation error: {0}")]
    FileOperation(#[from] FileOperationError),

    /// IO error
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl HandlerError {
    /// Whether the site rejected the configured credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, HandlerError::Prevodi(PrevodiError::Auth(_)))
    }
}
