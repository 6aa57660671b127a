//! # krackscan-ctrl
//!
//! Client for the text control interface of the access point daemon under
//! test (the hostapd/wpa_supplicant `wpa_ctrl` protocol).
//!
//! Two transports are supported. When the control path names an existing
//! Unix datagram socket the client binds its own socket file and connects
//! to it. Otherwise the path is treated as a hostname, the client talks UDP
//! and every request carries the cookie handed out by `GET_COOKIE`.
//!
//! ## Example
//!
//! ```no_run
//! use krackscan_ctrl::{ControlChannel, ControlLink};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ctrl = ControlChannel::open("/var/run/hostapd/wlan0")?;
//! ctrl.attach()?;
//! let key = ctrl.daemon_command("GET_TK 00:11:22:33:44:55", Duration::from_secs(2))?;
//! println!("TK = {}", key.trim());
//! ctrl.close()?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]
#![warn(clippy::all)]

pub mod ctrl;
pub mod error;

pub use ctrl::{
    BindNames, ControlChannel, ControlLink, CtrlConnector, TransportMode, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_UDP_PORT, LOG_TARGET,
};
pub use error::{CtrlError, Result};
