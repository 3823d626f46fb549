//! Naming and moving subtitle files
//!
//! Subtitles are stored next to each other in a per-episode cache directory
//! and named after the video they belong to, so the player picks them up
//! automatically: `Show.S01E01.mkv` gets `Show.S01E01.hr.srt`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during file operations
#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed { path: PathBuf, source: io::Error },

    #[error("Failed to rename {from} to {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Missing file name in: {0}")]
    MissingFileName(String),
}

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// Replaces characters that are invalid or problematic in filenames across platforms:
/// - Path separators: / \
/// - Reserved characters: : * ? " < > |
/// - Control characters
/// - Trim leading/trailing whitespace and dots
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    // Trim whitespace and dots from start/end
    sanitized
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Turns spaces and underscores into dashes and collapses dash runs
///
/// Used both for server supplied archive names and for the per-show cache
/// directory names.
///
/// ```
/// assert_eq!(prevodi::dashify("My--Show_Name S01E01.rar"), "My-Show-Name-S01E01.rar");
/// ```
pub fn dashify(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for c in name.chars() {
        let c = match c {
            ' ' | '_' => '-',
            c => c,
        };
        if c == '-' && result.ends_with('-') {
            continue;
        }
        result.push(c);
    }

    result
}

/// Returns the subtitle file name for a video, language and extension
///
/// Only the last path component of `video_path` is used, which also works
/// for non-local media paths such as `smb://host/share/video.mkv`.
pub fn subtitle_candidate(video_path: &str, lang: &str, extension: &str) -> String {
    let file_name = video_path.rsplit(['/', '\\']).next().unwrap_or(video_path);
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    format!("{}.{}.{}", stem, lang, extension)
}

/// Lists subtitles already present in `dir` for the given video and language
///
/// Any extension is accepted. A missing directory yields an empty list.
pub fn possible_subtitles(
    dir: &Path,
    video_path: &str,
    lang: &str,
) -> Result<Vec<PathBuf>, FileOperationError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    // "<stem>.<lang>." followed by any extension
    let candidate = subtitle_candidate(video_path, lang, "");

    let entries = fs::read_dir(dir).map_err(|e| FileOperationError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&candidate) && n.len() > candidate.len())
        })
        .collect();

    found.sort();
    Ok(found)
}

/// Renames an extracted subtitle to its final name inside `dir`
pub fn execute_rename(
    source: &Path,
    dir: &Path,
    final_name: &str,
) -> Result<PathBuf, FileOperationError> {
    let destination = dir.join(final_name);

    fs::rename(source, &destination).map_err(|e| FileOperationError::RenameFailed {
        from: source.to_path_buf(),
        to: destination.clone(),
        source: e,
    })?;

    Ok(destination)
}

/// Copies a file into `output_dir`, keeping its file name
///
/// Creates the output directory if it doesn't exist.
pub fn execute_copy(source: &Path, output_dir: &Path) -> Result<PathBuf, FileOperationError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| FileOperationError::MissingFileName(source.display().to_string()))?;
    let destination = output_dir.join(file_name);

    fs::create_dir_all(output_dir)
        .and_then(|_| fs::copy(source, &destination))
        .map_err(|e| FileOperationError::CopyFailed {
            from: source.to_path_buf(),
            to: destination.clone(),
            source: e,
        })?;

    Ok(destination)
}
