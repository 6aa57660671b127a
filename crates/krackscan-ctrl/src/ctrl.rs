use std::fs;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{CtrlError, Result};
use log::{debug, info, warn};

/// Port the daemon listens on when its control interface is UDP based
pub const DEFAULT_UDP_PORT: u16 = 9877;

/// Reply deadline used by ATTACH/DETACH and friends
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const COOKIE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REPLY: usize = 4096;

/// `log` target for control channel traffic
pub const LOG_TARGET: &str = "krackscan::ctrl";

/// Request/reply access to the daemon, as needed by key lookups.
pub trait ControlLink {
    /// Send one command and wait for its reply datagram.
    fn request(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>>;

    /// Discard unsolicited event datagrams that are already queued.
    fn drain_events(&mut self) -> Result<usize>;

    /// Send a command and reject replies from a daemon that lacks it.
    fn daemon_command(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let reply = self.request(command, timeout)?;
        let reply = String::from_utf8_lossy(&reply).into_owned();
        if reply.contains("UNKNOWN COMMAND") {
            let name = command.split_whitespace().next().unwrap_or(command);
            return Err(CtrlError::UnknownCommand(name.to_string()));
        }
        Ok(reply)
    }
}

/// Hands out unique local socket paths of the form `<dir>/<prefix><pid>-<n>`.
#[derive(Debug)]
pub struct BindNames {
    dir: PathBuf,
    prefix: String,
    pid: u32,
    next: AtomicU32,
}

impl BindNames {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: "krackscan_ctrl_".to_string(),
            pid: std::process::id(),
            next: AtomicU32::new(0),
        }
    }

    pub fn next_path(&self) -> PathBuf {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}{}-{}", self.prefix, self.pid, n))
    }
}

impl Default for BindNames {
    fn default() -> Self {
        Self::new("/tmp")
    }
}

struct LocalSocketCleanup {
    path: PathBuf,
}

impl Drop for LocalSocketCleanup {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// How requests reach the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Unix datagram socket next to the daemon
    Local,
    /// UDP with a per-session cookie prefix
    Udp,
}

// Field order matters: the socket must close before its path is unlinked.
enum Transport {
    Local {
        socket: UnixDatagram,
        peer: PathBuf,
        local: LocalSocketCleanup,
    },
    Udp {
        socket: UdpSocket,
        peer: SocketAddr,
        cookie: Vec<u8>,
    },
}

impl Transport {
    fn fd(&self) -> RawFd {
        match self {
            Transport::Local { socket, .. } => socket.as_raw_fd(),
            Transport::Udp { socket, .. } => socket.as_raw_fd(),
        }
    }

    fn send(&self, command: &str) -> io::Result<()> {
        match self {
            Transport::Local { socket, .. } => {
                socket.send(command.as_bytes())?;
            }
            Transport::Udp {
                socket,
                peer,
                cookie,
            } => {
                let mut datagram = Vec::with_capacity(cookie.len() + command.len());
                datagram.extend_from_slice(cookie);
                datagram.extend_from_slice(command.as_bytes());
                socket.send_to(&datagram, *peer)?;
            }
        }
        Ok(())
    }

    fn recv(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_REPLY];
        let n = match self {
            Transport::Local { socket, .. } => socket.recv(&mut buf)?,
            Transport::Udp { socket, .. } => socket.recv_from(&mut buf)?.0,
        };
        buf.truncate(n);
        Ok(buf)
    }
}

/// Opens control channels. Owns the sequence used for local bind names.
#[derive(Debug)]
pub struct CtrlConnector {
    udp_port: u16,
    request_timeout: Duration,
    names: BindNames,
}

impl Default for CtrlConnector {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            names: BindNames::default(),
        }
    }
}

impl CtrlConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Directory where local (client side) socket files are created
    pub fn with_local_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.names = BindNames::new(dir);
        self
    }

    /// Open a channel to `path`.
    ///
    /// An existing socket file selects the local transport; anything else is
    /// resolved as a hostname and spoken to over UDP.
    pub fn connect(&self, path: &str) -> Result<ControlChannel> {
        let is_socket = fs::metadata(path)
            .map(|meta| meta.file_type().is_socket())
            .unwrap_or(false);

        let transport = if is_socket {
            self.connect_local(path)?
        } else {
            self.connect_udp(path)?
        };

        Ok(ControlChannel {
            transport: Some(transport),
            attached: false,
            request_timeout: self.request_timeout,
        })
    }

    fn connect_local(&self, path: &str) -> Result<Transport> {
        let local_path = self.names.next_path();
        if local_path.exists() {
            let _ = fs::remove_file(&local_path);
        }

        let socket = UnixDatagram::bind(&local_path).map_err(|e| {
            CtrlError::connect(
                path,
                format!("failed to bind local socket at {:?}: {}", local_path, e),
            )
        })?;
        let local = LocalSocketCleanup { path: local_path };

        socket
            .connect(path)
            .map_err(|e| CtrlError::connect(path, format!("failed to connect: {}", e)))?;

        debug!(target: LOG_TARGET, "Control interface {} opened via {:?}", path, local.path);
        Ok(Transport::Local {
            socket,
            peer: PathBuf::from(path),
            local,
        })
    }

    fn connect_udp(&self, host: &str) -> Result<Transport> {
        let peer = (host, self.udp_port)
            .to_socket_addrs()
            .map_err(|e| CtrlError::connect(host, format!("cannot resolve: {}", e)))?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| CtrlError::connect(host, "no IPv4 address"))?;

        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| CtrlError::connect(host, format!("failed to bind UDP socket: {}", e)))?;

        socket
            .send_to(b"GET_COOKIE", peer)
            .map_err(|e| CtrlError::connect(host, format!("failed to request cookie: {}", e)))?;

        let ready = wait_readable(socket.as_raw_fd(), COOKIE_TIMEOUT)
            .map_err(|e| CtrlError::connect(host, e))?;
        if !ready {
            return Err(CtrlError::connect(host, "no reply to GET_COOKIE"));
        }

        let mut buf = vec![0u8; MAX_REPLY];
        let (n, _) = socket
            .recv_from(&mut buf)
            .map_err(|e| CtrlError::connect(host, format!("failed to read cookie: {}", e)))?;
        buf.truncate(n);

        debug!(
            target: LOG_TARGET,
            "Control interface {} opened over UDP ({} byte cookie)", peer, n
        );
        Ok(Transport::Udp {
            socket,
            peer,
            cookie: buf,
        })
    }
}

/// One session with the daemon's control interface
pub struct ControlChannel {
    transport: Option<Transport>,
    attached: bool,
    request_timeout: Duration,
}

impl ControlChannel {
    /// Shorthand for `CtrlConnector::default().connect(path)`
    pub fn open(path: &str) -> Result<Self> {
        CtrlConnector::default().connect(path)
    }

    fn transport(&self) -> Result<&Transport> {
        self.transport.as_ref().ok_or(CtrlError::Closed)
    }

    pub fn mode(&self) -> Option<TransportMode> {
        self.transport.as_ref().map(|t| match t {
            Transport::Local { .. } => TransportMode::Local,
            Transport::Udp { .. } => TransportMode::Udp,
        })
    }

    /// Cookie returned by GET_COOKIE (UDP only)
    pub fn cookie(&self) -> Option<&[u8]> {
        match self.transport.as_ref()? {
            Transport::Udp { cookie, .. } => Some(cookie),
            Transport::Local { .. } => None,
        }
    }

    /// Path of our own bound socket (local transport only)
    pub fn local_path(&self) -> Option<&Path> {
        match self.transport.as_ref()? {
            Transport::Local { local, .. } => Some(&local.path),
            Transport::Udp { .. } => None,
        }
    }

    /// Human readable daemon endpoint
    pub fn peer(&self) -> Option<String> {
        match self.transport.as_ref()? {
            Transport::Local { peer, .. } => Some(peer.display().to_string()),
            Transport::Udp { peer, .. } => Some(peer.to_string()),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Send `command` and block until a reply datagram arrives or `timeout` passes.
    pub fn request(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        let transport = self.transport()?;
        transport.send(command)?;

        if !wait_readable(transport.fd(), timeout)? {
            return Err(CtrlError::Timeout {
                command: command.to_string(),
                timeout,
            });
        }
        Ok(transport.recv()?)
    }

    /// Is a datagram waiting right now?
    pub fn pending(&self) -> Result<bool> {
        self.pending_within(Duration::ZERO)
    }

    /// Is a datagram waiting, or does one arrive within `timeout`?
    pub fn pending_within(&self, timeout: Duration) -> Result<bool> {
        let transport = self.transport()?;
        Ok(wait_readable(transport.fd(), timeout)?)
    }

    /// Read one datagram (normally an unsolicited event)
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        Ok(self.transport()?.recv()?)
    }

    /// Subscribe to unsolicited events. No-op when already attached.
    pub fn attach(&mut self) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        let reply = self.request("ATTACH", self.request_timeout)?;
        if !contains(&reply, b"OK") {
            return Err(CtrlError::protocol("ATTACH", &reply));
        }
        self.attached = true;
        info!(target: LOG_TARGET, "Attached to control interface");
        Ok(())
    }

    /// Drop the event subscription. No-op when not attached.
    pub fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        let drained = self.drain_events()?;
        if drained > 0 {
            debug!(target: LOG_TARGET, "Discarded {} pending events before DETACH", drained);
        }
        let reply = self.request("DETACH", self.request_timeout)?;
        if contains(&reply, b"FAIL") {
            return Err(CtrlError::protocol("DETACH", &reply));
        }
        self.attached = false;
        Ok(())
    }

    /// Ask the daemon to exit, then close our side.
    pub fn terminate(&mut self) -> Result<()> {
        let detach_result = self.detach_for_teardown();

        let sent = match self.transport() {
            Ok(transport) => transport.send("TERMINATE").map_err(CtrlError::from),
            Err(err) => Err(err),
        };
        let closed = self.close();

        detach_result.and(sent).and(closed)
    }

    /// Release the socket and any local socket file. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        let detach_result = if self.transport.is_some() {
            self.detach_for_teardown()
        } else {
            Ok(())
        };

        if let Some(transport) = self.transport.take() {
            if let Transport::Local { local, .. } = &transport {
                debug!(target: LOG_TARGET, "Closing control interface, removing {:?}", local.path);
            }
            drop(transport);
        }
        detach_result
    }

    // A refused DETACH means the daemon already dropped us; anything else is reported.
    fn detach_for_teardown(&mut self) -> Result<()> {
        match self.detach() {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_detached() => {
                debug!(target: LOG_TARGET, "DETACH refused during teardown: {}", err);
                self.attached = false;
                Ok(())
            }
            Err(err) => {
                self.attached = false;
                Err(err)
            }
        }
    }
}

impl ControlLink for ControlChannel {
    fn request(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        ControlChannel::request(self, command, timeout)
    }

    fn drain_events(&mut self) -> Result<usize> {
        let mut drained = 0;
        while self.pending()? {
            let _ = self.recv()?;
            drained += 1;
        }
        Ok(drained)
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(target: LOG_TARGET, "Error while closing control interface: {}", err);
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc > 0);
    }
}
