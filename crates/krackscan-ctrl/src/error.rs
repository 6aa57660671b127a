//! Error types for krackscan-ctrl

use std::time::Duration;

use thiserror::Error;

/// Result type alias for control interface operations
pub type Result<T> = std::result::Result<T, CtrlError>;

/// Errors raised while talking to the access point daemon
#[derive(Error, Debug)]
pub enum CtrlError {
    /// Transport could not be set up (resolution, bind or connect failed)
    #[error("Failed to open control interface '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    /// No reply datagram arrived before the deadline
    #[error("Timed out after {timeout:?} waiting for reply to '{command}'")]
    Timeout { command: String, timeout: Duration },

    /// The daemon replied with something other than what the command requires
    #[error("Control command '{command}' failed: {reply}")]
    Protocol { command: String, reply: String },

    /// The daemon does not implement the command at all
    #[error("Daemon did not recognize the command '{0}'. Was it built with the test extensions?")]
    UnknownCommand(String),

    /// The channel has already been closed
    #[error("Control interface is closed")]
    Closed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtrlError {
    pub(crate) fn connect(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn protocol(command: &str, reply: &[u8]) -> Self {
        Self::Protocol {
            command: command.to_string(),
            reply: String::from_utf8_lossy(reply).trim().to_string(),
        }
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The daemon refused DETACH, which it does when we are no longer attached.
    pub fn is_already_detached(&self) -> bool {
        matches!(self, Self::Protocol { command, .. } if command == "DETACH")
    }
}
