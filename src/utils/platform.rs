//! Platform and architecture detection, used to pick a static ffmpeg build.

use std::fmt;

/// The operating system the program is running on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    Mac,
    /// Any other operating system, by its `std::env::consts::OS` name.
    Unknown(String),
}

/// The CPU architecture the program is running on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Architecture {
    X64,
    X86,
    Armv7l,
    Aarch64,
    /// Any other architecture, by its `std::env::consts::ARCH` name.
    Unknown(String),
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "Windows"),
            Platform::Linux => write!(f, "Linux"),
            Platform::Mac => write!(f, "MacOS"),
            Platform::Unknown(os) => write!(f, "Unknown: {}", os),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X64 => write!(f, "x64"),
            Architecture::X86 => write!(f, "x86"),
            Architecture::Armv7l => write!(f, "armv7l"),
            Architecture::Aarch64 => write!(f, "aarch64"),
            Architecture::Unknown(arch) => write!(f, "Unknown: {}", arch),
        }
    }
}

impl Platform {
    /// Detects the current platform.
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::Mac,
            _ => Platform::Unknown(os.to_string()),
        }
    }
}

impl Architecture {
    /// Detects the current CPU architecture.
    pub fn detect() -> Self {
        Self::from_arch(std::env::consts::ARCH)
    }

    fn from_arch(arch: &str) -> Self {
        match arch {
            "x86_64" => Architecture::X64,
            "x86" => Architecture::X86,
            "arm" | "armv7l" => Architecture::Armv7l,
            "aarch64" => Architecture::Aarch64,
            _ => Architecture::Unknown(arch.to_string()),
        }
    }
}
