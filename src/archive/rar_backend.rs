use super::{ArchiveBackend, ArchiveError};
use std::ffi::OsStr;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::process::{Command, Output};

/// RAR reader running the external unrar executable
pub(crate) struct RarBackend {
    path: PathBuf,
    unrar: PathBuf,
}

impl RarBackend {
    pub(crate) fn new(path: &Path, unrar: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            unrar: unrar.to_path_buf(),
        }
    }

    /// Runs unrar, turning spawn failures and non-zero exits into messages
    fn run(&self, args: &[&OsStr]) -> Result<Output, String> {
        let output = Command::new(&self.unrar)
            .args(args)
            .output()
            .map_err(|e| format!("Failed to run {}: {}", self.unrar.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "unrar exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        Ok(output)
    }
}

impl ArchiveBackend for RarBackend {
    fn list(&mut self) -> Result<Vec<String>, ArchiveError> {
        // `lb` prints bare member names, one per line
        let output = self
            .run(&[OsStr::new("lb"), self.path.as_os_str()])
            .map_err(|reason| ArchiveError::OpenFailed {
                path: self.path.clone(),
                reason,
            })?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn extract(&mut self, member: &str, destination: &Path) -> Result<PathBuf, ArchiveError> {
        let extraction_failed = |reason: String| ArchiveError::Extraction {
            path: self.path.clone(),
            member: member.to_string(),
            reason,
        };

        // unrar treats the last argument as a directory only with a trailing separator
        let mut destination_arg = destination.as_os_str().to_os_string();
        if !destination_arg.to_string_lossy().ends_with(MAIN_SEPARATOR_STR) {
            destination_arg.push(MAIN_SEPARATOR_STR);
        }

        self.run(&[
            OsStr::new("x"),
            OsStr::new("-o+"),
            OsStr::new("-y"),
            OsStr::new("-idq"),
            self.path.as_os_str(),
            OsStr::new(member),
            destination_arg.as_os_str(),
        ])
        .map_err(extraction_failed)?;

        let target = destination.join(member);
        if !target.is_file() {
            return Err(extraction_failed(format!(
                "{} was not created",
                target.display()
            )));
        }

        Ok(target)
    }
}
