//! External unrar executable management
//!
//! RAR archives (RAR5 in particular) are unpacked by running the vendor's
//! `unrar` binary. A bundled manifest maps each supported platform to a
//! download URL and an install path. The binary is downloaded on first use
//! into the unrar directory and reused afterwards. Platforms without a
//! download use an `unrar` found on `PATH`.

use flate2::read::GzDecoder;
use humansize::{DECIMAL, format_size};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Manifest shipped with the crate
const BUNDLED_MANIFEST: &str = include_str!("../../resources/unrar.json");

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// File name looked up in the `PATH` directories
#[cfg(windows)]
const UNRAR_EXECUTABLE: &str = "unrar.exe";
#[cfg(not(windows))]
const UNRAR_EXECUTABLE: &str = "unrar";

/// Errors that can occur while resolving the unrar executable
#[derive(Debug, Error)]
pub enum UnrarError {
    /// No unrar build exists for this platform
    #[error("UNRAR for OS '{os}' and arch '{arch}' is not supported")]
    UnsupportedPlatform { os: String, arch: String },

    /// The platform is known but the manifest lacks an entry for it
    #[error("No unrar download listed for '{0}'")]
    MissingManifestEntry(String),

    /// The manifest is not valid JSON of the expected shape
    #[error("Invalid unrar manifest: {0}")]
    ManifestInvalid(#[from] serde_json::Error),

    /// Failed to create the install directory
    #[error("Failed to create unrar directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to download the executable
    #[error("Failed to download unrar from {url}: {source}")]
    DownloadFailed {
        url: String,
        source: reqwest::Error,
    },

    /// HTTP error during download
    #[error("HTTP error downloading unrar: {0}")]
    HttpError(String),

    /// Failed to unpack or write the executable
    #[error("Failed to write unrar executable {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    Linux,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
    ArmV4,
    /// ARMv5 and newer 32-bit ARM
    ArmV5Up,
}

/// Operating system and CPU architecture the unrar build is selected by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformKey {
    /// Builds a key from an OS name and a machine name as printed by `uname -m`
    pub fn from_parts(os: &str, machine: &str) -> Result<Self, UnrarError> {
        let unsupported = || UnrarError::UnsupportedPlatform {
            os: os.to_string(),
            arch: machine.to_string(),
        };

        let os_lower = os.to_lowercase();
        let os_kind = if os_lower.starts_with("win") {
            Os::Windows
        } else if os_lower.starts_with("linux") {
            Os::Linux
        } else if os_lower == "macos" || os_lower == "darwin" {
            Os::MacOs
        } else {
            return Err(unsupported());
        };

        let machine_lower = machine.to_lowercase();
        let arch = match machine_lower.as_str() {
            "x86_64" | "amd64" => Arch::X86_64,
            "x86" | "i386" | "i486" | "i586" | "i686" => Arch::X86,
            "aarch64" | "arm64" => Arch::Aarch64,
            "arm" => Arch::ArmV5Up,
            m if m.starts_with("armv4") => Arch::ArmV4,
            m if m.starts_with("armv") => Arch::ArmV5Up,
            _ => return Err(unsupported()),
        };

        Ok(Self { os: os_kind, arch })
    }

    /// Detects the platform the process runs on
    ///
    /// The machine name comes from `uname -m`, which tells ARM sub-versions
    /// apart. Windows and a failing `uname` fall back to the compile-time
    /// architecture.
    pub fn detect() -> Result<Self, UnrarError> {
        let machine = if cfg!(windows) {
            None
        } else {
            Command::new("uname")
                .arg("-m")
                .output()
                .ok()
                .filter(|output| output.status.success())
                .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
                .filter(|machine| !machine.is_empty())
        };
        let machine = machine.unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Self::from_parts(std::env::consts::OS, &machine)
    }

    /// Returns the manifest key of this platform, if an unrar build exists
    pub fn manifest_key(&self) -> Option<&'static str> {
        match (self.os, self.arch) {
            (Os::Windows, _) => Some("windows"),
            (Os::Linux, Arch::X86_64) => Some("linux_x86_64"),
            (Os::Linux, Arch::ArmV4) => Some("linux_armv4"),
            (Os::Linux, Arch::ArmV5Up) => Some("linux_armv5up"),
            (Os::MacOs, Arch::X86_64) => Some("macos_x86_64"),
            (Os::MacOs, Arch::Aarch64) => Some("macos_aarch64"),
            (Os::Linux, Arch::X86 | Arch::Aarch64)
            | (Os::MacOs, Arch::X86 | Arch::ArmV4 | Arch::ArmV5Up) => None,
        }
    }

    fn unsupported(&self) -> UnrarError {
        UnrarError::UnsupportedPlatform {
            os: format!("{:?}", self.os),
            arch: format!("{:?}", self.arch),
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}_{:?}", self.os, self.arch)
    }
}

/// How a downloaded executable is packed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Compression {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "gz")]
    Gzip,
    /// A gzipped tarball; the executable is the entry named by `member`
    #[serde(rename = "tar.gz")]
    TarGzip,
}

/// Where to get the executable for one platform and where to put it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// Install path relative to the unrar directory
    pub path: String,
    #[serde(default)]
    pub compression: Compression,
    /// Path of the executable inside a tarball
    #[serde(default)]
    pub member: Option<String>,
}

/// Platform key to download entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct UnrarManifest(HashMap<String, ManifestEntry>);

impl UnrarManifest {
    pub fn from_json(json: &str) -> Result<Self, UnrarError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The manifest bundled in `resources/unrar.json`
    pub fn bundled() -> Result<Self, UnrarError> {
        Self::from_json(BUNDLED_MANIFEST)
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.0.get(key)
    }
}

/// The unrar executable used for RAR archives
#[derive(Debug, Clone)]
pub enum UnrarTool {
    /// An executable at a fixed path, never downloaded
    Pinned(PathBuf),
    /// Downloaded into `install_dir` on first use
    Managed {
        install_dir: PathBuf,
        manifest: UnrarManifest,
        /// Detected on first use when `None`
        platform: Option<PlatformKey>,
    },
}

impl UnrarTool {
    /// Uses the executable at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        UnrarTool::Pinned(path.into())
    }

    pub fn managed(
        install_dir: impl Into<PathBuf>,
        manifest: UnrarManifest,
        platform: Option<PlatformKey>,
    ) -> Self {
        UnrarTool::Managed {
            install_dir: install_dir.into(),
            manifest,
            platform,
        }
    }

    /// Manages the executable in `install_dir` using the bundled manifest
    pub fn bundled(install_dir: impl Into<PathBuf>) -> Result<Self, UnrarError> {
        Ok(Self::managed(install_dir, UnrarManifest::bundled()?, None))
    }

    /// Returns the path of the executable, downloading it if necessary
    ///
    /// When the manifest has no download for the platform, an `unrar` on
    /// `PATH` is used instead.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let unrar = UnrarTool::bundled(&dirs.unrar)?.ensure()?;
    /// ```
    pub fn ensure(&self) -> Result<PathBuf, UnrarError> {
        self.ensure_with_path(env::var_os("PATH").as_deref())
    }

    fn ensure_with_path(&self, search_path: Option<&OsStr>) -> Result<PathBuf, UnrarError> {
        let (install_dir, manifest, platform) = match self {
            UnrarTool::Pinned(path) => return Ok(path.clone()),
            UnrarTool::Managed {
                install_dir,
                manifest,
                platform,
            } => (install_dir, manifest, platform),
        };

        let entry = (*platform)
            .map_or_else(PlatformKey::detect, Ok)
            .and_then(|platform| {
                debug!(%platform, "Resolving unrar");
                let key = platform.manifest_key().ok_or_else(|| platform.unsupported())?;
                manifest
                    .get(key)
                    .ok_or_else(|| UnrarError::MissingManifestEntry(key.to_string()))
            });
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                return match search_path.and_then(find_on_path) {
                    Some(path) => {
                        info!(path = %path.display(), "Using unrar from PATH");
                        Ok(path)
                    }
                    None => Err(e),
                };
            }
        };

        let target = install_dir.join(&entry.path);
        if target.is_file() {
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| UnrarError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        download(entry, &target)?;

        Ok(target)
    }
}

/// Downloads an executable to `target`, unpacking it when compressed
fn download(entry: &ManifestEntry, target: &Path) -> Result<(), UnrarError> {
    let url = &entry.url;
    info!(%url, target = %target.display(), "Downloading unrar");

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| UnrarError::DownloadFailed {
            url: url.clone(),
            source: e,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| UnrarError::DownloadFailed {
            url: url.clone(),
            source: e,
        })?;

    if !response.status().is_success() {
        return Err(UnrarError::HttpError(format!(
            "HTTP {} while downloading unrar from {}",
            response.status(),
            url
        )));
    }

    let body = response.bytes().map_err(|e| UnrarError::DownloadFailed {
        url: url.clone(),
        source: e,
    })?;

    // Written next to the target first, then renamed into place
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unrar".to_string());
    let temp_path = target.with_file_name(format!("{}.tmp", file_name));
    let write_failed = |e| UnrarError::WriteFailed {
        path: temp_path.clone(),
        source: e,
    };

    let executable = unpack_executable(entry, &body).map_err(write_failed)?;

    fs::write(&temp_path, &executable).map_err(write_failed)?;
    make_executable(&temp_path).map_err(write_failed)?;

    fs::rename(&temp_path, target).map_err(|e| UnrarError::WriteFailed {
        path: target.to_path_buf(),
        source: e,
    })?;

    info!(
        size = %format_size(executable.len() as u64, DECIMAL),
        path = %target.display(),
        "unrar installed"
    );

    Ok(())
}

/// Returns the executable bytes of a downloaded body
fn unpack_executable(entry: &ManifestEntry, body: &[u8]) -> io::Result<Vec<u8>> {
    let mut unpacked = Vec::new();

    match entry.compression {
        Compression::None => unpacked.extend_from_slice(body),
        Compression::Gzip => {
            GzDecoder::new(body).read_to_end(&mut unpacked)?;
        }
        Compression::TarGzip => {
            let member = entry.member.as_deref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "tarball entry without member")
            })?;

            let mut archive = tar::Archive::new(GzDecoder::new(body));
            let mut found = false;
            for file in archive.entries()? {
                let mut file = file?;
                if file.path()? == Path::new(member) {
                    file.read_to_end(&mut unpacked)?;
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found in tarball", member),
                ));
            }
        }
    }

    Ok(unpacked)
}

/// Finds the unrar executable in a `PATH`-style list of directories
fn find_on_path(search_path: &OsStr) -> Option<PathBuf> {
    env::split_paths(search_path)
        .map(|dir| dir.join(UNRAR_EXECUTABLE))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_parts() {
        let key = PlatformKey::from_parts("linux", "x86_64").unwrap();
        assert_eq!(key.manifest_key(), Some("linux_x86_64"));

        let key = PlatformKey::from_parts("Linux", "armv4tl").unwrap();
        assert_eq!(key.arch, Arch::ArmV4);
        assert_eq!(key.manifest_key(), Some("linux_armv4"));

        let key = PlatformKey::from_parts("linux", "armv7l").unwrap();
        assert_eq!(key.arch, Arch::ArmV5Up);
        assert_eq!(key.manifest_key(), Some("linux_armv5up"));

        let key = PlatformKey::from_parts("windows", "x86").unwrap();
        assert_eq!(key.manifest_key(), Some("windows"));
    }

    #[test]
    fn test_unmapped_platforms() {
        assert!(matches!(
            PlatformKey::from_parts("freebsd", "x86_64"),
            Err(UnrarError::UnsupportedPlatform { .. })
        ));
        assert!(matches!(
            PlatformKey::from_parts("linux", "riscv64"),
            Err(UnrarError::UnsupportedPlatform { .. })
        ));

        let key = PlatformKey::from_parts("darwin", "arm64").unwrap();
        assert_eq!(key.manifest_key(), Some("macos_aarch64"));
        let key = PlatformKey::from_parts("macos", "i386").unwrap();
        assert_eq!(key.manifest_key(), None);
        let key = PlatformKey::from_parts("linux", "aarch64").unwrap();
        assert_eq!(key.manifest_key(), None);
    }

    #[test]
    fn test_bundled_manifest_uses_vendor_tarballs() {
        let manifest = UnrarManifest::bundled().unwrap();
        for key in ["linux_x86_64", "macos_x86_64", "macos_aarch64"] {
            let entry = manifest.get(key).unwrap_or_else(|| panic!("missing {}", key));
            assert!(entry.url.starts_with("https://www.rarlab.com/rar/"), "{}", entry.url);
            assert_eq!(entry.compression, Compression::TarGzip);
            assert_eq!(entry.member.as_deref(), Some("rar/unrar"));
        }

        // No standalone vendor executable, these rely on PATH
        for key in ["windows", "linux_armv4", "linux_armv5up"] {
            assert!(manifest.get(key).is_none(), "unexpected {}", key);
        }
    }

    #[test]
    fn test_unpack_tarball_member() {
        use flate2::write::GzEncoder;

        let script = b"#!/bin/sh\necho unrar\n";
        let mut builder = tar::Builder::new(GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        ));
        for (name, data) in [("rar/rar", &b"not this one"[..]), ("rar/unrar", &script[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        let tarball = builder.into_inner().unwrap().finish().unwrap();

        let entry = ManifestEntry {
            url: "https://www.rarlab.com/rar/rarlinux-x64-712.tar.gz".to_string(),
            path: "unrar".to_string(),
            compression: Compression::TarGzip,
            member: Some("rar/unrar".to_string()),
        };
        assert_eq!(unpack_executable(&entry, &tarball).unwrap(), script);

        let missing = ManifestEntry {
            member: Some("rar/unrar.exe".to_string()),
            ..entry.clone()
        };
        assert_eq!(
            unpack_executable(&missing, &tarball).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );

        let no_member = ManifestEntry {
            member: None,
            ..entry
        };
        assert!(unpack_executable(&no_member, &tarball).is_err());
    }

    #[test]
    fn test_manifest_compression() {
        let manifest = UnrarManifest::from_json(
            r#"{
                "linux_x86_64": {"url": "http://x/unrar.gz", "path": "unrar-x86_64", "compression": "gz"},
                "windows": {"url": "http://x/unrar.exe", "path": "unrarw32.exe", "compression": ""},
                "linux_armv4": {"url": "http://x/unrar-armv4", "path": "unrar-armv4"}
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.get("linux_x86_64").unwrap().compression, Compression::Gzip);
        assert_eq!(manifest.get("windows").unwrap().compression, Compression::None);
        assert_eq!(manifest.get("linux_armv4").unwrap().compression, Compression::None);
        assert_eq!(manifest.get("linux_armv4").unwrap().member, None);
        assert!(UnrarManifest::from_json(r#"{"windows": {"url": 1}}"#).is_err());
    }

    #[test]
    fn test_pinned_is_returned_as_is() {
        let tool = UnrarTool::at("/opt/unrar");
        assert_eq!(tool.ensure().unwrap(), PathBuf::from("/opt/unrar"));
    }

    #[test]
    fn test_existing_executable_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("unrar-x86_64"), b"#!/bin/sh\n").unwrap();

        let manifest = UnrarManifest::from_json(
            r#"{"linux_x86_64": {"url": "http://127.0.0.1:9/unreachable", "path": "unrar-x86_64"}}"#,
        )
        .unwrap();
        let platform = PlatformKey::from_parts("linux", "x86_64").unwrap();
        let tool = UnrarTool::managed(dir.path(), manifest, Some(platform));

        assert_eq!(tool.ensure().unwrap(), dir.path().join("unrar-x86_64"));
    }

    #[test]
    fn test_missing_manifest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let platform = PlatformKey::from_parts("linux", "armv6l").unwrap();
        let tool = UnrarTool::managed(dir.path(), UnrarManifest::default(), Some(platform));

        assert!(matches!(
            tool.ensure_with_path(None),
            Err(UnrarError::MissingManifestEntry(key)) if key == "linux_armv5up"
        ));
    }

    #[test]
    fn test_unsupported_platform_on_ensure() {
        let dir = tempfile::tempdir().unwrap();
        let platform = PlatformKey::from_parts("linux", "aarch64").unwrap();
        let tool = UnrarTool::managed(dir.path(), UnrarManifest::bundled().unwrap(), Some(platform));

        let empty_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            tool.ensure_with_path(Some(empty_dir.path().as_os_str())),
            Err(UnrarError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_falls_back_to_unrar_on_path() {
        let install_dir = tempfile::tempdir().unwrap();
        let bin_dir = tempfile::tempdir().unwrap();
        let empty_dir = tempfile::tempdir().unwrap();
        let system_unrar = bin_dir.path().join(UNRAR_EXECUTABLE);
        fs::write(&system_unrar, b"").unwrap();

        let search_path =
            env::join_paths([empty_dir.path(), bin_dir.path()]).unwrap();

        // Windows has no vendor download
        let platform = PlatformKey::from_parts("windows", "x86_64").unwrap();
        let tool = UnrarTool::managed(
            install_dir.path(),
            UnrarManifest::bundled().unwrap(),
            Some(platform),
        );
        assert_eq!(
            tool.ensure_with_path(Some(search_path.as_os_str())).unwrap(),
            system_unrar
        );

        // Unsupported architectures too
        let platform = PlatformKey::from_parts("linux", "x86").unwrap();
        let tool = UnrarTool::managed(install_dir.path(), UnrarManifest::default(), Some(platform));
        assert_eq!(
            tool.ensure_with_path(Some(search_path.as_os_str())).unwrap(),
            system_unrar
        );
    }
}
