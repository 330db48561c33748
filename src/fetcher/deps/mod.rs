//! Discovery and installation of the external tools the pipeline drives.
//!
//! A tool is looked up on the system executable search path first. When it is not there,
//! the bundled copies are used: the directory of the running executable, then any
//! additional directory configured by the caller (e.g. a `libs` directory populated by
//! [`ToolInstaller`]).

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::fetcher::deps::ffmpeg::BuildFetcher;
use crate::utils::{self, file_system};
use derive_more::Constructor;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod ffmpeg;

/// Locates a tool by name: system executable search path first, then the directory of the
/// running executable, then `extra_dirs` in order.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if the tool is in none of these places.
pub fn locate_tool(name: &str, extra_dirs: &[PathBuf]) -> Result<PathBuf> {
    let mut bundled = Vec::with_capacity(extra_dirs.len() + 1);
    if let Some(dir) = application_dir() {
        bundled.push(dir);
    }
    bundled.extend_from_slice(extra_dirs);

    locate_in(name, std::env::var_os("PATH"), &bundled)
}

/// Returns the directory containing the running executable.
pub fn application_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn locate_in(name: &str, search_path: Option<OsString>, bundled: &[PathBuf]) -> Result<PathBuf> {
    let executable = utils::find_executable(name);

    if let Some(search_path) = search_path {
        if let Some(found) = std::env::split_paths(&search_path)
            .map(|dir| dir.join(&executable))
            .find(|candidate| is_executable(candidate))
        {
            log::debug!("Using system {} at {}", name, found.display());
            return Ok(found);
        }
    }

    match bundled
        .iter()
        .map(|dir| dir.join(&executable))
        .find(|candidate| is_executable(candidate))
    {
        Some(found) => {
            log::debug!("Using bundled {} at {}", name, found.display());
            Ok(found)
        }
        None => Err(Error::ToolNotFound(name.to_string())),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// A release asset to download.
#[derive(Clone, Debug, PartialEq)]
pub struct WantedRelease {
    /// The download URL of the asset.
    pub url: String,
    /// The file name of the asset.
    pub name: String,
}

impl fmt::Display for WantedRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Release(name={}, url={})", self.name, self.url)
    }
}

impl WantedRelease {
    /// Downloads the asset to the given destination.
    pub async fn download(&self, destination: impl AsRef<Path> + fmt::Debug) -> Result<u64> {
        log::info!("Downloading {} to {:?}", self.name, destination);

        Fetcher::new(&self.url).fetch_asset(destination).await
    }
}

/// Installs the bundled tools into a directory.
///
/// # Examples
///
/// ```rust,no_run
/// # use yt_merge::fetcher::deps::ToolInstaller;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let installer = ToolInstaller::new(PathBuf::from("libs"));
/// let ffmpeg = installer.install_ffmpeg().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Constructor, Clone, Debug)]
pub struct ToolInstaller {
    /// The destination directory for the tools.
    pub destination: PathBuf,
}

impl ToolInstaller {
    /// Installs a static ffmpeg build for the current platform, returning the binary's path.
    pub async fn install_ffmpeg(&self) -> Result<PathBuf> {
        file_system::create_dir(&self.destination)?;

        let fetcher = BuildFetcher::new();
        let release = fetcher.fetch_binary()?;

        let archive = self.destination.join(&release.name);
        release.download(&archive).await?;

        fetcher.extract_binary(archive).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn system_path_wins_over_bundled_copy() {
        let system = tempfile::tempdir().unwrap();
        let bundled = tempfile::tempdir().unwrap();
        let expected = fake_tool(system.path(), "ffmpeg");
        fake_tool(bundled.path(), "ffmpeg");

        let path = std::env::join_paths([system.path()]).unwrap();
        let found = locate_in("ffmpeg", Some(path), &[bundled.path().to_path_buf()]).unwrap();

        assert_eq!(found, expected);
    }

    #[test]
    fn falls_back_to_bundled_copy() {
        let system = tempfile::tempdir().unwrap();
        let bundled = tempfile::tempdir().unwrap();
        let expected = fake_tool(bundled.path(), "ffmpeg");

        let path = std::env::join_paths([system.path()]).unwrap();
        let found = locate_in("ffmpeg", Some(path), &[bundled.path().to_path_buf()]).unwrap();

        assert_eq!(found, expected);
    }

    #[test]
    fn missing_everywhere_is_tool_not_found() {
        let empty = tempfile::tempdir().unwrap();
        let path = std::env::join_paths([empty.path()]).unwrap();

        let error = locate_in("ffmpeg", Some(path), &[empty.path().to_path_buf()]).unwrap_err();
        assert!(matches!(error, Error::ToolNotFound(name) if name == "ffmpeg"));
    }

    #[test]
    fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ffmpeg"), "not a program").unwrap();

        let result = locate_in("ffmpeg", None, &[dir.path().to_path_buf()]);
        assert!(result.is_err());
    }
}
