//! Cache storage module
//!
//! Every episode gets its own directory below the cache root,
//! `<root>/<show>/<season>x<episode>/`. It holds the scraped archive listing
//! as JSON and, once downloaded, the subtitle files themselves. Old entries
//! are swept away by age.

use crate::file_operations::dashify;
use serde::{Deserialize, Serialize};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to create or access cache directory
    #[error("Failed to create cache directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read cached data
    #[error("Failed to read cache file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write cached data
    #[error("Failed to write cache file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to remove an expired entry
    #[error("Unable to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to deserialize cached data
    #[error("Failed to deserialize cache file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize data for caching
    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Per-episode cache of serializable data
///
/// Each episode directory holds one JSON file named `file_name`.
pub struct CacheStorage<T> {
    /// The directory where cached data is stored
    root: PathBuf,
    /// Name of the JSON file inside an episode directory
    file_name: &'static str,
    /// Phantom data for the generic type
    _phantom: PhantomData<T>,
}

impl<T> CacheStorage<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens or creates a cache rooted at `root`
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let cache: CacheStorage<ArchiveListing> = CacheStorage::open(dirs.cache, "subtitles.json")?;
    /// ```
    pub fn open(root: impl Into<PathBuf>, file_name: &'static str) -> Result<Self, CacheError> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|e| CacheError::DirectoryCreationFailed {
            path: root.clone(),
            source: e,
        })?;

        Ok(Self {
            root,
            file_name,
            _phantom: PhantomData,
        })
    }

    /// Returns the directory of an episode
    ///
    /// `season` and `episode` are used verbatim, callers pass the two digit
    /// padded form.
    pub fn episode_dir(&self, show_title: &str, season: &str, episode: &str) -> PathBuf {
        self.root
            .join(dashify(show_title))
            .join(format!("{}x{}", season, episode))
    }

    /// Loads the cached data of an episode directory
    ///
    /// # Returns
    ///
    /// `None` if nothing was cached yet. Returns an error if the data exists
    /// but cannot be read or deserialized.
    pub fn load(&self, episode_dir: &Path) -> Result<Option<T>, CacheError> {
        let file_path = episode_dir.join(self.file_name);

        // If file doesn't exist, return None
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&file_path).map_err(|e| CacheError::ReadFailed {
            path: file_path.clone(),
            source: e,
        })?;

        let data =
            serde_json::from_str(&content).map_err(|e| CacheError::DeserializationFailed {
                path: file_path,
                source: e,
            })?;

        Ok(Some(data))
    }

    /// Stores data in an episode directory, creating it if needed
    ///
    /// Returns the path of the written file.
    pub fn store(&self, episode_dir: &Path, data: &T) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(episode_dir).map_err(|e| CacheError::DirectoryCreationFailed {
            path: episode_dir.to_path_buf(),
            source: e,
        })?;

        let file_path = episode_dir.join(self.file_name);
        let content = serde_json::to_string_pretty(data)?;

        fs::write(&file_path, content).map_err(|e| CacheError::WriteFailed {
            path: file_path.clone(),
            source: e,
        })?;

        Ok(file_path)
    }

    /// Removes files older than `max_age` and directories left empty
    ///
    /// The cache root itself is kept. Returns the removed paths.
    pub fn sweep(&self, max_age: Duration) -> Result<Vec<PathBuf>, CacheError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = Vec::new();

        remove_older_than(&self.root, cutoff, &mut removed)?;

        Ok(removed)
    }

    /// Returns the path to the cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Depth-first removal of expired files, then of empty directories
fn remove_older_than(
    dir: &Path,
    cutoff: SystemTime,
    removed: &mut Vec<PathBuf>,
) -> Result<(), CacheError> {
    let read_failed = |e| CacheError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    for entry in fs::read_dir(dir).map_err(read_failed)? {
        let path = entry.map_err(read_failed)?.path();

        if path.is_dir() {
            remove_older_than(&path, cutoff, removed)?;

            let is_empty = fs::read_dir(&path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                fs::remove_dir(&path).map_err(|e| CacheError::RemoveFailed {
                    path: path.clone(),
                    source: e,
                })?;
                removed.push(path);
            }
        } else {
            let expired = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(|modified| modified <= cutoff)
                .unwrap_or(false);
            if expired {
                fs::remove_file(&path).map_err(|e| CacheError::RemoveFailed {
                    path: path.clone(),
                    source: e,
                })?;
                removed.push(path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{ArchiveEntry, ArchiveListing};
    use std::fs::File;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn listing() -> ArchiveListing {
        let mut listing = ArchiveListing::new();
        listing.insert(
            "/preuzmi-prijevod/1/show-hr".to_string(),
            ArchiveEntry {
                description: "Show 1x01 Hrvatski".to_string(),
                suitability: "HDTV.x264-LOL".to_string(),
            },
        );
        listing.insert(
            "/preuzmi-prijevod/2/show-en".to_string(),
            ArchiveEntry {
                description: "Show 1x01 English".to_string(),
                suitability: String::new(),
            },
        );
        listing
    }

    fn age(path: &Path, by: Duration) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    #[test]
    fn test_episode_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache: CacheStorage<ArchiveListing> =
            CacheStorage::open(root.path(), "subtitles.json").unwrap();

        assert_eq!(
            cache.episode_dir("The Show_Name", "01", "02"),
            root.path().join("The-Show-Name").join("01x02")
        );
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let cache: CacheStorage<ArchiveListing> =
            CacheStorage::open(root.path(), "subtitles.json").unwrap();
        let dir = cache.episode_dir("Show", "01", "01");

        assert!(cache.load(&dir).unwrap().is_none());

        let written = cache.store(&dir, &listing()).unwrap();
        assert_eq!(written, dir.join("subtitles.json"));
        assert_eq!(cache.load(&dir).unwrap(), Some(listing()));
    }

    #[test]
    fn test_load_corrupted_file() {
        let root = tempfile::tempdir().unwrap();
        let cache: CacheStorage<ArchiveListing> =
            CacheStorage::open(root.path(), "subtitles.json").unwrap();
        let dir = cache.episode_dir("Show", "01", "01");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("subtitles.json"), "not json").unwrap();

        assert!(matches!(
            cache.load(&dir),
            Err(CacheError::DeserializationFailed { .. })
        ));
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let root = tempfile::tempdir().unwrap();
        let cache: CacheStorage<ArchiveListing> =
            CacheStorage::open(root.path(), "subtitles.json").unwrap();

        let old_dir = cache.episode_dir("Old Show", "01", "01");
        let old_file = cache.store(&old_dir, &listing()).unwrap();
        age(&old_file, 5 * DAY);

        let fresh_dir = cache.episode_dir("Fresh Show", "02", "03");
        let fresh_file = cache.store(&fresh_dir, &listing()).unwrap();

        let removed = cache.sweep(3 * DAY).unwrap();

        assert!(removed.contains(&old_file));
        assert!(removed.contains(&old_dir));
        assert!(!old_dir.exists());
        assert!(!root.path().join("Old-Show").exists());
        assert!(fresh_file.exists());
        assert!(root.path().exists());
    }
}
