//! Session key lookup and CCMP decryption attempts for client frames

use std::time::Duration;

use krackscan_ctrl::ControlLink;
use krackscan_logging::T_DETECT;
use krackscan_wireless::{
    decrypt_ccmp, starts_with_llc_snap, CapturedFrame, TemporalKey, ALL_ZERO_KEY,
};

use crate::client::ClientRecord;
use crate::error::Result;

/// Which key, if any, produced a plaintext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The capture path already decrypted the frame in hardware
    Cleartext,
    SessionKey,
    AllZeroKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decryption {
    pub plaintext: Vec<u8>,
    pub source: KeySource,
}

/// Fetches pairwise keys from the daemon under test and decrypts with them
#[derive(Debug, Clone)]
pub struct CcmpKeyService {
    request_timeout: Duration,
}

impl CcmpKeyService {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// The client's temporal key, asking the daemon with `GET_TK` when it
    /// is not cached yet. A `FAIL` reply leaves the key unset so the next
    /// frame asks again.
    pub fn resolve_key<C: ControlLink>(
        &self,
        client: &mut ClientRecord,
        ctrl: &mut C,
    ) -> Result<Option<TemporalKey>> {
        if let Some(key) = client.key() {
            return Ok(Some(*key));
        }

        ctrl.drain_events()?;
        let command = format!("GET_TK {}", client.mac());
        let reply = ctrl.daemon_command(&command, self.request_timeout)?;
        let reply = reply.trim();

        if reply.contains("FAIL") {
            tracing::debug!(
                target: T_DETECT,
                client = %client.mac(),
                "daemon has no key for client"
            );
            return Ok(None);
        }

        match parse_key(reply) {
            Some(key) => {
                tracing::debug!(target: T_DETECT, client = %client.mac(), "cached session key");
                client.set_key(key);
                Ok(Some(key))
            }
            None => {
                tracing::warn!(
                    target: T_DETECT,
                    client = %client.mac(),
                    reply,
                    "unparseable GET_TK reply"
                );
                Ok(None)
            }
        }
    }

    /// Recover the plaintext of a protected frame.
    ///
    /// Frames the driver already decrypted are returned as is. Otherwise
    /// the session key is tried, then the all-zero key.
    pub fn decrypt<C: ControlLink>(
        &self,
        frame: &CapturedFrame,
        client: &mut ClientRecord,
        ctrl: &mut C,
    ) -> Result<Option<Decryption>> {
        if starts_with_llc_snap(&frame.payload) {
            return Ok(Some(Decryption {
                plaintext: frame.payload.clone(),
                source: KeySource::Cleartext,
            }));
        }

        if let Some(key) = self.resolve_key(client, ctrl)? {
            if let Some(plaintext) = try_key(frame, &key) {
                return Ok(Some(Decryption {
                    plaintext,
                    source: KeySource::SessionKey,
                }));
            }
        }

        Ok(try_key(frame, &ALL_ZERO_KEY).map(|plaintext| Decryption {
            plaintext,
            source: KeySource::AllZeroKey,
        }))
    }

    /// True when the frame authenticates under the all-zero key
    pub fn probe_all_zero_key(&self, frame: &CapturedFrame) -> bool {
        try_key(frame, &ALL_ZERO_KEY).is_some()
    }
}

fn try_key(frame: &CapturedFrame, key: &TemporalKey) -> Option<Vec<u8>> {
    match decrypt_ccmp(frame.raw(), key) {
        Ok(plaintext) if starts_with_llc_snap(&plaintext) => Some(plaintext),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!(target: T_DETECT, error = %e, "decryption attempt failed");
            None
        }
    }
}

fn parse_key(reply: &str) -> Option<TemporalKey> {
    let bytes = hex::decode(reply).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{protected_frame, zero_key_frame, SESSION_KEY, STA};
    use krackscan_ctrl::CtrlError;

    /// Daemon stand-in answering GET_TK from a fixed reply
    struct KeyDaemon {
        reply: &'static str,
        requests: Vec<String>,
        drained: usize,
    }

    impl KeyDaemon {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                requests: Vec::new(),
                drained: 0,
            }
        }
    }

    impl ControlLink for KeyDaemon {
        fn request(
            &mut self,
            command: &str,
            _timeout: Duration,
        ) -> std::result::Result<Vec<u8>, CtrlError> {
            self.requests.push(command.to_string());
            Ok(self.reply.as_bytes().to_vec())
        }

        fn drain_events(&mut self) -> std::result::Result<usize, CtrlError> {
            self.drained += 1;
            Ok(0)
        }
    }

    fn service() -> CcmpKeyService {
        CcmpKeyService::new(Duration::from_secs(1))
    }

    #[test]
    fn key_is_fetched_once_and_cached() {
        let mut ctrl = KeyDaemon::new("42424242424242424242424242424242\n");
        let mut client = ClientRecord::new(STA);

        let key = service().resolve_key(&mut client, &mut ctrl).unwrap();
        assert_eq!(key, Some(SESSION_KEY));
        assert_eq!(ctrl.requests, vec![format!("GET_TK {}", STA)]);
        assert_eq!(ctrl.drained, 1);

        service().resolve_key(&mut client, &mut ctrl).unwrap();
        assert_eq!(ctrl.requests.len(), 1);
    }

    #[test]
    fn fail_reply_leaves_key_unset() {
        let mut ctrl = KeyDaemon::new("FAIL\n");
        let mut client = ClientRecord::new(STA);

        assert_eq!(service().resolve_key(&mut client, &mut ctrl).unwrap(), None);
        assert!(client.key().is_none());
        service().resolve_key(&mut client, &mut ctrl).unwrap();
        assert_eq!(ctrl.requests.len(), 2);
    }

    #[test]
    fn unknown_command_is_propagated() {
        let mut ctrl = KeyDaemon::new("UNKNOWN COMMAND\n");
        let mut client = ClientRecord::new(STA);
        let err = service().resolve_key(&mut client, &mut ctrl).unwrap_err();
        assert!(matches!(
            err,
            crate::DetectError::Ctrl(CtrlError::UnknownCommand(ref c)) if c == "GET_TK"
        ));
    }

    #[test]
    fn decrypt_with_session_key() {
        let mut ctrl = KeyDaemon::new("42424242424242424242424242424242");
        let mut client = ClientRecord::new(STA);
        let frame = protected_frame(1, 1, false, 0);

        let out = service().decrypt(&frame, &mut client, &mut ctrl).unwrap().unwrap();
        assert_eq!(out.source, KeySource::SessionKey);
        assert!(starts_with_llc_snap(&out.plaintext));
    }

    #[test]
    fn decrypt_falls_back_to_all_zero_key() {
        let mut ctrl = KeyDaemon::new("42424242424242424242424242424242");
        let mut client = ClientRecord::new(STA);
        let frame = zero_key_frame(1, 1, 0);

        let out = service().decrypt(&frame, &mut client, &mut ctrl).unwrap().unwrap();
        assert_eq!(out.source, KeySource::AllZeroKey);
    }

    #[test]
    fn cleartext_payload_needs_no_key() {
        let mut ctrl = KeyDaemon::new("FAIL");
        let mut client = ClientRecord::new(STA);
        let mut frame = protected_frame(1, 1, false, 0);
        frame.payload = krackscan_wireless::LLC_SNAP_PREFIX.to_vec();

        let out = service().decrypt(&frame, &mut client, &mut ctrl).unwrap().unwrap();
        assert_eq!(out.source, KeySource::Cleartext);
        assert!(ctrl.requests.is_empty());
    }

    #[test]
    fn all_zero_key_check_distinguishes_frames() {
        assert!(service().probe_all_zero_key(&zero_key_frame(1, 1, 0)));
        assert!(!service().probe_all_zero_key(&protected_frame(1, 1, false, 0)));
    }
}
