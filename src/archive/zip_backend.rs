use super::{ArchiveBackend, ArchiveError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// In-process ZIP reader
pub(crate) struct ZipBackend {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ZipBackend {
    pub(crate) fn open(path: &Path) -> Result<Self, ArchiveError> {
        let open_failed = |reason: String| ArchiveError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_failed(e.to_string()))?;
        let archive = ZipArchive::new(file).map_err(|e| open_failed(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }
}

impl ArchiveBackend for ZipBackend {
    fn list(&mut self) -> Result<Vec<String>, ArchiveError> {
        let mut members = Vec::new();

        for i in 0..self.archive.len() {
            let entry = self.archive.by_index(i).map_err(|e| ArchiveError::OpenFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            if entry.is_dir() {
                continue;
            }
            members.push(entry.name().to_string());
        }

        Ok(members)
    }

    fn extract(&mut self, member: &str, destination: &Path) -> Result<PathBuf, ArchiveError> {
        let extraction_failed = |reason: String| ArchiveError::Extraction {
            path: self.path.clone(),
            member: member.to_string(),
            reason,
        };

        let mut entry = self
            .archive
            .by_name(member)
            .map_err(|e| extraction_failed(e.to_string()))?;

        // Refuses names escaping the destination, like `../x.srt`
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| extraction_failed("unsafe member path".to_string()))?;

        let target = destination.join(relative);
        write_entry(&mut entry, &target).map_err(|e| extraction_failed(e.to_string()))?;

        Ok(target)
    }
}

fn write_entry(entry: &mut impl io::Read, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = File::create(target)?;
    io::copy(entry, &mut out)?;

    Ok(())
}
