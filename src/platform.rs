use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Host OS family, classified exactly once at controller construction.
///
/// Every later decision (device naming, command synthesis, read strategy)
/// branches on this fixed value, so no "unsupported" fallthrough remains
/// reachable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    /// Classify the host this process is running on.
    pub fn detect() -> Result<Self> {
        Self::classify(std::env::consts::OS)
    }

    pub(crate) fn classify(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::Darwin),
            "windows" => Ok(Platform::Windows),
            other => Err(Error::PlatformUnsupported {
                host: other.to_string(),
            }),
        }
    }

    /// The `stty` flag that selects a device file (`-F` is GNU, `-f` is BSD).
    pub(crate) fn stty_device_flag(self) -> &'static str {
        match self {
            Platform::Linux => "-F",
            Platform::Darwin => "-f",
            Platform::Windows => unreachable!("stty is never synthesized for Windows"),
        }
    }

    pub fn is_windows(self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub fn is_posix(self) -> bool {
        !self.is_windows()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Darwin => write!(f, "darwin"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}
