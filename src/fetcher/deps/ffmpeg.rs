//! Fetch a static 'ffmpeg' build for the current platform.

use crate::error::{Error, Result};
use crate::fetcher::deps::WantedRelease;
use crate::utils::file_system;
use crate::utils::platform::{Architecture, Platform};
use std::fmt;
use std::path::{Path, PathBuf};

const WINDOWS_BUILD: &str = "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip";
const MAC_INTEL_BUILD: &str = "https://www.osxexperts.net/ffmpeg71intel.zip";
const MAC_ARM_BUILD: &str = "https://www.osxexperts.net/ffmpeg71arm.zip";

fn linux_build(arch: &str) -> String {
    format!(
        "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-{}-static.tar.xz",
        arch
    )
}

/// The ffmpeg fetcher selects a static build for a platform and extracts its binary.
///
/// # Example
///
/// ```rust, no_run
/// # use yt_merge::fetcher::deps::ffmpeg::BuildFetcher;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = BuildFetcher::new();
/// let release = fetcher.fetch_binary()?;
///
/// let archive = PathBuf::from("libs").join(&release.name);
/// release.download(&archive).await?;
/// let ffmpeg = fetcher.extract_binary(archive).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct BuildFetcher;

impl fmt::Display for BuildFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildFetcher")
    }
}

impl BuildFetcher {
    /// Create a new fetcher for ffmpeg.
    pub fn new() -> Self {
        Self
    }

    /// Select the ffmpeg build for the current platform and architecture.
    pub fn fetch_binary(&self) -> Result<WantedRelease> {
        let platform = Platform::detect();
        let architecture = Architecture::detect();

        self.select_asset(&platform, &architecture)
            .ok_or(Error::Binary(platform, architecture))
    }

    /// Select the ffmpeg build for the given platform and architecture.
    pub fn select_asset(
        &self,
        platform: &Platform,
        architecture: &Architecture,
    ) -> Option<WantedRelease> {
        let url = match (platform, architecture) {
            (Platform::Windows, _) => WINDOWS_BUILD.to_string(),
            (Platform::Mac, Architecture::X64) => MAC_INTEL_BUILD.to_string(),
            (Platform::Mac, Architecture::Aarch64) => MAC_ARM_BUILD.to_string(),
            (Platform::Linux, Architecture::X64) => linux_build("amd64"),
            (Platform::Linux, Architecture::X86) => linux_build("i686"),
            (Platform::Linux, Architecture::Armv7l) => linux_build("armhf"),
            (Platform::Linux, Architecture::Aarch64) => linux_build("arm64"),
            _ => return None,
        };

        let name = url.rsplit('/').next()?.to_string();
        Some(WantedRelease { url, name })
    }

    /// Extract the ffmpeg binary from a downloaded archive.
    /// The binary is placed next to the archive, and the archive and its extracted tree are deleted.
    pub async fn extract_binary(
        &self,
        archive: impl AsRef<Path> + fmt::Debug,
    ) -> Result<PathBuf> {
        log::debug!("Extracting ffmpeg binary from archive: {:?}", archive);

        let archive = archive.as_ref().to_path_buf();
        let parent = file_system::try_parent(&archive)?;
        let destination = parent.join("ffmpeg-extracted");

        let name = archive.to_string_lossy();
        if name.ends_with(".zip") {
            file_system::extract_zip(&archive, &destination).await?;
        } else if name.ends_with(".tar.xz") {
            file_system::extract_tar_xz(&archive, &destination).await?;
        } else {
            return Err(Error::Path(format!("Unsupported archive: {}", name)));
        }

        let binary_name = crate::utils::find_executable("ffmpeg");
        let executable = find_file(&destination, &binary_name)?.ok_or_else(|| {
            Error::Path(format!("No {} in archive {}", binary_name, archive.display()))
        })?;

        let binary = parent.join(&binary_name);
        tokio::fs::copy(&executable, &binary).await?;

        tokio::fs::remove_dir_all(&destination).await?;
        tokio::fs::remove_file(&archive).await?;

        file_system::set_executable(&binary)?;

        Ok(binary)
    }
}

/// Depth-first search for a file named `name` below `dir`.
fn find_file(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            if let Some(found) = find_file(&path, name)? {
                return Ok(Some(found));
            }
        } else if path.file_name().is_some_and(|file| file == name) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_static_linux_build() {
        let release = BuildFetcher::new()
            .select_asset(&Platform::Linux, &Architecture::Aarch64)
            .unwrap();

        assert_eq!(release.name, "ffmpeg-release-arm64-static.tar.xz");
        assert!(release.url.starts_with("https://johnvansickle.com/"));
    }

    #[test]
    fn unknown_platforms_have_no_build() {
        let release = BuildFetcher::new().select_asset(
            &Platform::Unknown("haiku".to_string()),
            &Architecture::X64,
        );

        assert!(release.is_none());
    }

    #[test]
    fn finds_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("ffmpeg-7.0.2-amd64-static");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("ffprobe"), "").unwrap();
        std::fs::write(nested.join("ffmpeg"), "").unwrap();

        let found = find_file(dir.path(), "ffmpeg").unwrap();
        assert_eq!(found, Some(nested.join("ffmpeg")));
    }
}
