//! Utility functions and types used throughout the crate.

pub mod file_system;
pub mod platform;

/// Converts a vector of string slices to a vector of owned strings.
pub fn to_owned(args: Vec<impl AsRef<str>>) -> Vec<String> {
    args.into_iter().map(|arg| arg.as_ref().to_string()).collect()
}

/// Returns the file name of an executable for the current platform, e.g. `ffmpeg.exe` on Windows.
pub fn find_executable(name: impl AsRef<str>) -> String {
    let name = name.as_ref();

    if cfg!(target_os = "windows") && !name.ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}
