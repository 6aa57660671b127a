//! Error types for krackscan-core

use krackscan_ctrl::CtrlError;
use krackscan_wireless::WirelessError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectError>;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Control interface: {0}")]
    Ctrl(#[from] CtrlError),

    #[error("Wireless: {0}")]
    Wireless(#[from] WirelessError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DetectError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
