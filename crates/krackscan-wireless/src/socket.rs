//! Raw AF_PACKET socket bound to a monitor-mode interface

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use libc::{c_int, c_void, sockaddr_ll, AF_PACKET, SOCK_RAW};
use nix::net::if_::if_nametoindex;

use crate::error::{Result, WirelessError};
use crate::monitor::RawLink;
use crate::LOG_TARGET;

/// Maximum capture buffer size
const CAPTURE_BUFFER_SIZE: usize = 65536;

/// Check for the privileges raw sockets need
pub fn check_privileges() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Raw packet socket on one interface, used for both capture and injection
pub struct PacketSocket {
    fd: RawFd,
    ifindex: i32,
    interface: String,
    buffer: Vec<u8>,
}

impl PacketSocket {
    /// Open and bind a raw socket on `interface`
    pub fn open(interface: &str) -> Result<Self> {
        if !check_privileges() {
            return Err(WirelessError::Permission(
                "Root privileges required for raw packet sockets".into(),
            ));
        }

        let ifindex = if_nametoindex(interface)? as i32;
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        let fd = unsafe {
            libc::socket(AF_PACKET, SOCK_RAW | libc::SOCK_CLOEXEC, protocol as c_int)
        };
        if fd < 0 {
            return Err(WirelessError::Socket(format!(
                "Failed to create packet socket: {}",
                io::Error::last_os_error()
            )));
        }

        let mut addr: sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = AF_PACKET as u16;
        addr.sll_ifindex = ifindex;
        addr.sll_protocol = protocol;

        let bind_result = unsafe {
            libc::bind(
                fd,
                &addr as *const sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<sockaddr_ll>() as u32,
            )
        };
        if bind_result < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(WirelessError::Socket(format!(
                "Failed to bind packet socket to {}: {}",
                interface, err
            )));
        }

        tracing::debug!(
            target: LOG_TARGET,
            interface,
            ifindex,
            "opened packet socket"
        );

        Ok(Self {
            fd,
            ifindex,
            interface: interface.to_string(),
            buffer: vec![0u8; CAPTURE_BUFFER_SIZE],
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }
}

impl RawLink for PacketSocket {
    fn transmit(&mut self, packet: &[u8]) -> Result<()> {
        let sent = unsafe {
            libc::send(self.fd, packet.as_ptr() as *const c_void, packet.len(), 0)
        };
        if sent < 0 {
            return Err(WirelessError::Injection(format!(
                "Send failed on {}: {}",
                self.interface,
                io::Error::last_os_error()
            )));
        }
        if sent as usize != packet.len() {
            return Err(WirelessError::Injection(format!(
                "Short send on {}: {} of {} bytes",
                self.interface,
                sent,
                packet.len()
            )));
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        let received = unsafe {
            libc::recv(
                self.fd,
                self.buffer.as_mut_ptr() as *mut c_void,
                self.buffer.len(),
                libc::MSG_DONTWAIT,
            )
        };

        if received < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(WirelessError::capture(format!("Receive failed: {}", err))),
            };
        }
        if received == 0 {
            return Ok(None);
        }

        Ok(Some(self.buffer[..received as usize].to_vec()))
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(c_int::MAX as u128) as c_int;
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(WirelessError::capture(format!("Poll failed: {}", err)));
        }
        Ok(ready > 0 && pfd.revents & libc::POLLIN != 0)
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}
