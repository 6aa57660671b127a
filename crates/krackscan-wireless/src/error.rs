//! Error types for krackscan-wireless

use thiserror::Error;

/// Result type alias for wireless operations
pub type Result<T> = std::result::Result<T, WirelessError>;

/// Main error type for wireless operations
#[derive(Error, Debug)]
pub enum WirelessError {
    /// Interface not found or invalid
    #[error("Interface error: {0}")]
    Interface(String),

    /// Packet injection failed
    #[error("Injection error: {0}")]
    Injection(String),

    /// Captured data could not be read or is malformed
    #[error("Capture error: {0}")]
    Capture(String),

    /// CCMP authentication failed (wrong key or corrupted frame)
    #[error("Decrypt error: {0}")]
    Decrypt(String),

    /// Socket operation failed
    #[error("Socket error: {0}")]
    Socket(String),

    /// Insufficient privileges
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Invalid MAC address
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// Invalid frame format
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WirelessError {
    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create an invalid-frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Captured bytes that fail like this are noise, not faults
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::Capture(_) | Self::InvalidFrame(_) | Self::InvalidMac(_)
        )
    }
}

impl From<nix::Error> for WirelessError {
    fn from(err: nix::Error) -> Self {
        match err {
            nix::Error::EPERM | nix::Error::EACCES => {
                Self::Permission(format!("Operation not permitted: {}", err))
            }
            nix::Error::ENODEV | nix::Error::ENOENT | nix::Error::ENXIO => {
                Self::Interface(format!("Interface not found: {}", err))
            }
            _ => Self::Socket(format!("System error: {}", err)),
        }
    }
}
