//! Subtitle archive handling
//!
//! The site serves subtitles packed as ZIP or RAR. Both are wrapped behind
//! [`Archive`], which lists members and extracts a single one. ZIP archives
//! are read in-process, RAR archives go through the external `unrar`
//! executable (see [`unrar`]).

mod rar_backend;
pub mod unrar;
mod zip_backend;

use rar_backend::RarBackend;
use unrar::{UnrarError, UnrarTool};
use zip_backend::ZipBackend;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while handling an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file extension is neither `zip` nor `rar`
    #[error("Cannot handle archive '{0}'")]
    UnsupportedFormat(PathBuf),

    /// The archive could not be opened or read
    #[error("Failed to open archive {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Extracting a member failed
    #[error("Failed to extract '{member}' from {path}: {reason}")]
    Extraction {
        path: PathBuf,
        member: String,
        reason: String,
    },

    /// Deleting the archive file failed
    #[error("Failed to remove archive {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The unrar executable is not available
    #[error(transparent)]
    Unrar(#[from] UnrarError),
}

/// Container formats the site uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    /// Determines the format from the (case-insensitive) file extension
    pub fn from_path(path: &Path) -> Result<Self, ArchiveError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        match extension.as_deref() {
            Some("zip") => Ok(ArchiveFormat::Zip),
            Some("rar") => Ok(ArchiveFormat::Rar),
            _ => Err(ArchiveError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Format specific reading of an archive
pub(crate) trait ArchiveBackend {
    /// Returns the paths of all files in the archive, in archive order
    fn list(&mut self) -> Result<Vec<String>, ArchiveError>;

    /// Extracts `member` below `destination`, returning the written file
    fn extract(&mut self, member: &str, destination: &Path) -> Result<PathBuf, ArchiveError>;
}

/// A subtitle archive on disk
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
    unrar_path: Option<PathBuf>,
    backend: Box<dyn ArchiveBackend>,
}

impl Archive {
    /// Opens the archive at `path`
    ///
    /// For RAR archives the unrar executable is resolved first, which may
    /// download it. ZIP archives never touch `unrar`.
    pub fn open(path: impl Into<PathBuf>, unrar: &UnrarTool) -> Result<Self, ArchiveError> {
        let path = path.into();
        let format = ArchiveFormat::from_path(&path)?;

        let (backend, unrar_path): (Box<dyn ArchiveBackend>, Option<PathBuf>) = match format {
            ArchiveFormat::Zip => (Box::new(ZipBackend::open(&path)?), None),
            ArchiveFormat::Rar => {
                let executable = unrar.ensure()?;
                debug!(unrar = %executable.display(), "Using unrar");
                (
                    Box::new(RarBackend::new(&path, &executable)),
                    Some(executable),
                )
            }
        };

        Ok(Self {
            path,
            format,
            unrar_path,
            backend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// The unrar executable in use, `None` for ZIP archives
    pub fn unrar_path(&self) -> Option<&Path> {
        self.unrar_path.as_deref()
    }

    /// Lists the files in the archive
    pub fn list(&mut self) -> Result<Vec<String>, ArchiveError> {
        self.backend.list()
    }

    /// Extracts one member into `destination`, keeping its relative path
    pub fn extract(&mut self, member: &str, destination: &Path) -> Result<PathBuf, ArchiveError> {
        debug!(member, destination = %destination.display(), "Extracting");
        self.backend.extract(member, destination)
    }

    /// Deletes the archive file
    pub fn remove(self) -> Result<(), ArchiveError> {
        let Archive { path, backend, .. } = self;
        // Release the open file handle first, Windows refuses to delete otherwise
        drop(backend);

        fs::remove_file(&path).map_err(|e| ArchiveError::RemoveFailed { path, source: e })
    }
}
