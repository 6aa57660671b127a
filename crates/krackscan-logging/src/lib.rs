#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;
pub mod fs;
pub mod init;
pub mod targets;

pub use config::LoggingConfig;
pub use init::{init, LoggingGuards};
pub use targets::{T_CTRL, T_DETECT, T_WIFI};
