#![cfg(unix)]

use std::net::UdpSocket;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use krackscan_ctrl::{ControlLink, CtrlConnector, CtrlError, TransportMode};

const COOKIE: &[u8] = b"COOKIE=0123456789abcdef";

fn reply_for(command: &[u8]) -> Vec<Vec<u8>> {
    let text = String::from_utf8_lossy(command).to_string();
    if text == "GET_COOKIE" {
        vec![COOKIE.to_vec()]
    } else if text.ends_with("ATTACH") && !text.ends_with("DETACH") {
        vec![b"OK\n".to_vec(), b"<3>AP-STA-CONNECTED 00:11:22:33:44:55".to_vec()]
    } else if text.ends_with("DETACH") {
        vec![b"OK\n".to_vec()]
    } else if text.ends_with("PING") {
        vec![b"PONG\n".to_vec()]
    } else if text.ends_with("SILENT") || text.ends_with("TERMINATE") {
        Vec::new()
    } else {
        vec![b"UNKNOWN COMMAND\n".to_vec()]
    }
}

fn refuse_attach(command: &[u8]) -> Vec<Vec<u8>> {
    if command.ends_with(b"ATTACH") && !command.ends_with(b"DETACH") {
        vec![b"FAIL\n".to_vec()]
    } else {
        reply_for(command)
    }
}

/// Fake UDP daemon: records every datagram it receives.
fn spawn_udp_daemon() -> (u16, Receiver<Vec<u8>>) {
    spawn_udp_daemon_with(reply_for)
}

fn spawn_udp_daemon_with(replies_to: fn(&[u8]) -> Vec<Vec<u8>>) -> (u16, Receiver<Vec<u8>>) {
    let server = UdpSocket::bind("127.0.0.1:0").expect("bind fake daemon");
    server
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let port = server.local_addr().expect("addr").port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        while let Ok((n, from)) = server.recv_from(&mut buf) {
            let datagram = buf[..n].to_vec();
            let replies = replies_to(&datagram);
            let done = datagram.ends_with(b"TERMINATE");
            let _ = tx.send(datagram);
            for reply in replies {
                let _ = server.send_to(&reply, from);
            }
            if done {
                break;
            }
        }
    });

    (port, rx)
}

/// Fake local daemon bound at `<dir>/hostapd`; DETACH is refused.
fn spawn_unix_daemon(dir: &Path) -> (PathBuf, Receiver<Vec<u8>>) {
    let path = dir.join("hostapd");
    let server = UnixDatagram::bind(&path).expect("bind fake daemon");
    server
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        while let Ok((n, from)) = server.recv_from(&mut buf) {
            let datagram = buf[..n].to_vec();
            let replies = if datagram == b"DETACH" {
                vec![b"FAIL\n".to_vec()]
            } else {
                reply_for(&datagram)
            };
            let _ = tx.send(datagram);
            if let Some(peer) = from.as_pathname() {
                for reply in replies {
                    let _ = server.send_to(&reply, peer);
                }
            }
        }
    });

    (path, rx)
}

#[test]
fn udp_requests_carry_the_session_cookie() {
    let (port, seen) = spawn_udp_daemon();
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .with_request_timeout(Duration::from_secs(2))
        .connect("127.0.0.1")
        .expect("connect");

    assert_eq!(ctrl.mode(), Some(TransportMode::Udp));
    assert_eq!(ctrl.cookie(), Some(COOKIE));

    ctrl.attach().expect("attach");
    assert!(ctrl.is_attached());

    let first = seen.recv_timeout(Duration::from_secs(2)).expect("GET_COOKIE");
    assert_eq!(first, b"GET_COOKIE");

    let second = seen.recv_timeout(Duration::from_secs(2)).expect("ATTACH");
    assert_eq!(second, cookied(b"ATTACH"));

    ctrl.terminate().expect("terminate");
    assert!(ctrl.is_closed());

    let rest: Vec<Vec<u8>> =
        std::iter::from_fn(|| seen.recv_timeout(Duration::from_secs(2)).ok())
            .take(2)
            .collect();
    assert_eq!(rest, vec![cookied(b"DETACH"), cookied(b"TERMINATE")]);
}

fn cookied(command: &[u8]) -> Vec<u8> {
    let mut datagram = COOKIE.to_vec();
    datagram.extend_from_slice(command);
    datagram
}

#[test]
fn refused_attach_is_a_protocol_error() {
    let (port, _seen) = spawn_udp_daemon_with(refuse_attach);
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .with_request_timeout(Duration::from_secs(2))
        .connect("127.0.0.1")
        .expect("connect");

    let err = ctrl.attach().unwrap_err();
    match err {
        CtrlError::Protocol { command, reply } => {
            assert_eq!(command, "ATTACH");
            assert_eq!(reply, "FAIL");
        }
        other => panic!("expected protocol error, got {other}"),
    }
    assert!(!ctrl.is_attached());
}

#[test]
fn second_attach_sends_nothing() {
    let (port, seen) = spawn_udp_daemon();
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .with_request_timeout(Duration::from_secs(2))
        .connect("127.0.0.1")
        .expect("connect");

    ctrl.attach().expect("attach");
    ctrl.attach().expect("attach again");
    assert!(ctrl.is_attached());

    assert_eq!(
        seen.recv_timeout(Duration::from_secs(2)).expect("GET_COOKIE"),
        b"GET_COOKIE"
    );
    assert_eq!(
        seen.recv_timeout(Duration::from_secs(2)).expect("ATTACH"),
        cookied(b"ATTACH")
    );
    assert!(seen.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn request_timeout_leaves_channel_usable() {
    let (port, _seen) = spawn_udp_daemon();
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .connect("127.0.0.1")
        .expect("connect");

    let err = ctrl
        .request("SILENT", Duration::from_millis(100))
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err}");

    let reply = ctrl.request("PING", Duration::from_secs(2)).expect("ping");
    assert_eq!(reply, b"PONG\n");
}

#[test]
fn unknown_command_reply_is_reported() {
    let (port, _seen) = spawn_udp_daemon();
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .connect("127.0.0.1")
        .expect("connect");

    let err = ctrl
        .daemon_command("GET_TK 00:11:22:33:44:55", Duration::from_secs(2))
        .unwrap_err();
    assert!(matches!(err, CtrlError::UnknownCommand(ref c) if c == "GET_TK"));
}

#[test]
fn udp_connect_without_daemon_fails() {
    // Bind and drop to get a port that nothing listens on.
    let port = {
        let unused = UdpSocket::bind("127.0.0.1:0").expect("bind");
        unused.local_addr().expect("addr").port()
    };
    let result = CtrlConnector::new().with_udp_port(port).connect("127.0.0.1");
    assert!(matches!(result, Err(CtrlError::Connect { .. })));
}

#[test]
fn local_socket_session_cleans_up_bind_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (daemon_path, seen) = spawn_unix_daemon(dir.path());
    let local_dir = dir.path().join("client");
    std::fs::create_dir_all(&local_dir).expect("client dir");

    let connector = CtrlConnector::new()
        .with_local_dir(&local_dir)
        .with_request_timeout(Duration::from_secs(2));
    let mut ctrl = connector
        .connect(daemon_path.to_str().expect("utf8 path"))
        .expect("connect");

    assert_eq!(ctrl.mode(), Some(TransportMode::Local));
    assert!(ctrl.cookie().is_none());
    let local = ctrl.local_path().expect("local path").to_path_buf();
    assert!(local.exists());

    ctrl.attach().expect("attach");
    // ATTACH is sent raw, without any cookie.
    assert_eq!(
        seen.recv_timeout(Duration::from_secs(2)).expect("ATTACH"),
        b"ATTACH"
    );

    // The daemon refuses DETACH; close swallows exactly that.
    thread::sleep(Duration::from_millis(50));
    ctrl.close().expect("close");
    assert!(!ctrl.is_attached());
    assert!(!local.exists());

    // Second close is a no-op.
    ctrl.close().expect("second close");

    // The event queued after ATTACH was drained before DETACH went out.
    assert_eq!(
        seen.recv_timeout(Duration::from_secs(2)).expect("DETACH"),
        b"DETACH"
    );
}

#[test]
fn stale_socket_file_fails_and_releases_bind_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stale = dir.path().join("hostapd");
    drop(UnixDatagram::bind(&stale).expect("bind"));
    let local_dir = dir.path().join("client");
    std::fs::create_dir_all(&local_dir).expect("client dir");

    let result = CtrlConnector::new()
        .with_local_dir(&local_dir)
        .connect(stale.to_str().expect("utf8 path"));
    assert!(matches!(result, Err(CtrlError::Connect { .. })));

    let leftover = std::fs::read_dir(&local_dir).expect("read dir").count();
    assert_eq!(leftover, 0);
}

#[test]
fn local_bind_names_advance_per_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (daemon_path, _seen) = spawn_unix_daemon(dir.path());
    let path = daemon_path.to_str().expect("utf8 path");

    let connector = CtrlConnector::new().with_local_dir(dir.path());
    let first = connector.connect(path).expect("first");
    let second = connector.connect(path).expect("second");

    assert_ne!(first.local_path(), second.local_path());
}

#[test]
fn closed_channel_rejects_requests() {
    let (port, _seen) = spawn_udp_daemon();
    let mut ctrl = CtrlConnector::new()
        .with_udp_port(port)
        .connect("127.0.0.1")
        .expect("connect");
    ctrl.close().expect("close");

    let err = ctrl.request("PING", Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, CtrlError::Closed));
}
