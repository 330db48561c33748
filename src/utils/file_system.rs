//! Tools for working with the file system.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::fs::{File, OpenOptions};
use uuid::Uuid;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Returns the parent directory of the given path.
pub fn try_parent(path: impl AsRef<Path>) -> Result<PathBuf> {
    let parent = path
        .as_ref()
        .parent()
        .ok_or(Error::Path("Failed to get parent".to_string()))?;

    Ok(parent.to_path_buf())
}

/// Creates (or truncates) a file at the given destination, opened for writing.
///
/// # Arguments
///
/// * `destination` - The path to create the file at.
pub async fn create_file(destination: impl AsRef<Path>) -> Result<File> {
    let mut open_options = OpenOptions::new();
    open_options.write(true);
    open_options.create(true);
    open_options.truncate(true);

    #[cfg(unix)]
    {
        open_options.mode(0o644);
    }

    let file = open_options.open(destination).await?;
    Ok(file)
}

/// Creates a new directory at the given destination.
/// If the directory already exists, nothing is done.
pub fn create_dir(destination: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(destination)?;
    Ok(())
}

/// Creates the parent directory of the given destination.
/// If the parent directory already exists, nothing is done.
pub fn create_parent_dir(destination: impl AsRef<Path>) -> Result<()> {
    match destination.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)?,
        _ => {}
    }

    Ok(())
}

/// Extracts a zip file to the given destination.
///
/// # Arguments
///
/// * `zip_path` - The path to the zip file.
/// * `destination` - The path to extract the zip file to.
pub async fn extract_zip(
    zip_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    log::debug!(
        "Extracting zip file: {:?} to {:?}",
        zip_path.as_ref(),
        destination.as_ref()
    );

    let file = File::open(zip_path).await?.into_std().await;
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut archive = ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let target = destination.join(
                entry
                    .enclosed_name()
                    .ok_or(Error::Path("Archive entry escapes destination".to_string()))?,
            );

            if entry.is_file() {
                create_parent_dir(&target)?;
                let mut out = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut out)?;
            }
        }

        Ok(())
    })
    .await?
}

/// Extracts a tar.xz file to the given destination.
///
/// # Arguments
///
/// * `tar_path` - The path to the tar.xz file.
/// * `destination` - The path to extract the tar.xz file to.
pub async fn extract_tar_xz(
    tar_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    log::debug!(
        "Extracting tar.xz file: {:?} to {:?}",
        tar_path.as_ref(),
        destination.as_ref()
    );

    let file = File::open(tar_path).await?.into_std().await;
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut archive = Archive::new(XzDecoder::new(file));
        archive.unpack(destination)?;
        Ok(())
    })
    .await?
}

/// Sets the executable bit on the given file.
#[cfg(not(target_os = "windows"))]
pub fn set_executable(executable: impl AsRef<Path>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(executable.as_ref())?.permissions();

    perms.set_mode(0o755);
    std::fs::set_permissions(executable, perms)?;

    Ok(())
}

/// No-op on Windows, which has no executable bit.
#[cfg(target_os = "windows")]
pub fn set_executable(_executable: impl AsRef<Path>) -> Result<()> {
    Ok(())
}

/// Generates a random lowercase hexadecimal string of the given length (at most 32).
pub fn random_filename(length: usize) -> String {
    let uuid = Uuid::new_v4().simple().to_string();

    uuid.chars().take(length).collect()
}

/// Removes a temporary file and logs any errors.
/// Does not propagate errors to avoid interrupting the execution flow.
///
/// # Returns
///
/// `true` if the file was deleted or did not exist, `false` otherwise.
pub async fn remove_temp_file(file_path: impl AsRef<Path> + std::fmt::Debug) -> bool {
    match tokio::fs::remove_file(&file_path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            log::warn!("Failed to remove temporary file {:?}: {}", file_path, e);
            false
        }
    }
}
