use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorReason, OrchestrationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "win",
            Platform::MacOs => "osx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    X64,
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &str {
        match self {
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
        }
    }
}

/// Host operating system and CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpecifics {
    pub platform: Platform,
    pub architecture: Architecture,
}

impl PlatformSpecifics {
    pub fn new(platform: Platform, architecture: Architecture) -> Self {
        Self {
            platform,
            architecture,
        }
    }

    pub fn current() -> Result<Self> {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_names(os: &str, arch: &str) -> Result<Self> {
        let platform = match os {
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            other => {
                return Err(OrchestrationError::workload(
                    format!("The OS/system platform '{}' is not supported.", other),
                    ErrorReason::PlatformNotSupported,
                )
                .into())
            }
        };

        let architecture = match arch {
            "x86_64" => Architecture::X64,
            "aarch64" => Architecture::Arm64,
            other => {
                return Err(OrchestrationError::workload(
                    format!("The CPU/processor architecture '{}' is not supported.", other),
                    ErrorReason::ProcessorArchitectureNotSupported,
                )
                .into())
            }
        };

        Ok(Self::new(platform, architecture))
    }

    /// `platform-architecture` form used by supported-platform declarations, e.g. `linux-x64`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.platform.as_str(), self.architecture.as_str())
    }
}
