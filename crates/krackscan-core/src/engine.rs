//! Capture loop and client table

use std::collections::BTreeMap;
use std::time::Duration;

use krackscan_ctrl::ControlLink;
use krackscan_logging::T_DETECT;
use krackscan_wireless::{CapturedFrame, MacAddress, MonitorTransport, RawLink};
use tracing::{debug, info, trace, warn};

use crate::cancel::{is_cancelled, CancelFlag};
use crate::client::{ClientRecord, Evidence, TimingPolicy, Verdict, VulnStatus};
use crate::error::{DetectError, Result};
use crate::keys::CcmpKeyService;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// BSSID of the access point whose clients are classified
    pub ap_mac: MacAddress,
    pub policy: TimingPolicy,
    /// Upper bound on one capture wait
    pub poll_interval: Duration,
    /// Also decrypt every frame with the client's session key
    pub decrypt_payloads: bool,
}

impl EngineOptions {
    pub fn new(ap_mac: MacAddress) -> Self {
        Self {
            ap_mac,
            policy: TimingPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            decrypt_payloads: false,
        }
    }
}

/// One line of the end-of-run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub mac: MacAddress,
    pub status: VulnStatus,
    pub frames_seen: u64,
    pub highest_iv: Option<u64>,
    pub no_reset_intervals: u32,
}

pub struct DetectionEngine<L: RawLink, C: ControlLink> {
    monitor: MonitorTransport<L>,
    ctrl: C,
    keys: CcmpKeyService,
    clients: BTreeMap<MacAddress, ClientRecord>,
    options: EngineOptions,
}

impl<L: RawLink, C: ControlLink> DetectionEngine<L, C> {
    pub fn new(
        monitor: MonitorTransport<L>,
        ctrl: C,
        keys: CcmpKeyService,
        options: EngineOptions,
    ) -> Self {
        Self {
            monitor,
            ctrl,
            keys,
            clients: BTreeMap::new(),
            options,
        }
    }

    /// Process frames until `stop` is set or a fatal error occurs
    pub fn run(&mut self, stop: &CancelFlag) -> Result<()> {
        info!(
            target: T_DETECT,
            ap = %self.options.ap_mac,
            "monitoring clients for pairwise key reinstallation"
        );
        while !is_cancelled(stop) {
            self.poll_once()?;
        }
        info!(target: T_DETECT, clients = self.clients.len(), "capture loop stopped");
        Ok(())
    }

    /// Wait up to the poll interval for one captured frame and handle it
    pub fn poll_once(&mut self) -> Result<Option<Verdict>> {
        if !self.monitor.wait_readable(self.options.poll_interval)? {
            return Ok(None);
        }
        match self.monitor.receive()? {
            Some(frame) => self.handle_frame(&frame),
            None => Ok(None),
        }
    }

    /// Classify one captured frame. Returns the verdict if the transmitting
    /// client's status changed.
    pub fn handle_frame(&mut self, frame: &CapturedFrame) -> Result<Option<Verdict>> {
        if !frame.is_data() || !frame.protected {
            return Ok(None);
        }

        let (sta, ap) = frame.station_and_ap();
        if ap != self.options.ap_mac || frame.destination != self.options.ap_mac {
            trace!(target: T_DETECT, %sta, %ap, "frame not sent to the monitored AP");
            return Ok(None);
        }
        let Some(iv) = frame.iv else {
            return Ok(None);
        };

        let client = self.clients.entry(sta).or_insert_with(|| {
            info!(target: T_DETECT, client = %sta, "new client");
            ClientRecord::new(sta)
        });
        debug!(target: T_DETECT, client = %sta, iv, seq = frame.seq, "transmitted data");

        let all_zero_key = self.keys.probe_all_zero_key(frame);

        if self.options.decrypt_payloads {
            match self.keys.decrypt(frame, client, &mut self.ctrl) {
                Ok(Some(plain)) => trace!(
                    target: T_DETECT,
                    client = %sta,
                    source = ?plain.source,
                    len = plain.plaintext.len(),
                    "decrypted payload"
                ),
                Ok(None) => {
                    debug!(target: T_DETECT, client = %sta, iv, "payload did not decrypt")
                }
                Err(DetectError::Ctrl(e)) if e.is_timeout() => {
                    warn!(target: T_DETECT, client = %sta, error = %e, "key lookup timed out")
                }
                Err(e) => return Err(e),
            }
        }

        let verdict = client.observe(frame, all_zero_key, &self.options.policy);
        if let Some(v) = verdict {
            report(sta, &v);
        }
        Ok(verdict)
    }

    pub fn client(&self, mac: &MacAddress) -> Option<&ClientRecord> {
        self.clients.get(mac)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }

    pub fn summary(&self) -> Vec<ClientSummary> {
        self.clients
            .values()
            .map(|c| ClientSummary {
                mac: c.mac(),
                status: c.status(),
                frames_seen: c.frames_seen(),
                highest_iv: c.ivs().highest(),
                no_reset_intervals: c.no_reset_intervals(),
            })
            .collect()
    }

    pub fn log_summary(&self) {
        if self.clients.is_empty() {
            info!(target: T_DETECT, "no clients transmitted protected data");
            return;
        }
        for line in self.summary() {
            info!(
                target: T_DETECT,
                client = %line.mac,
                status = %line.status,
                frames = line.frames_seen,
                highest_iv = ?line.highest_iv,
                "final verdict"
            );
        }
    }

    pub fn monitor(&self) -> &MonitorTransport<L> {
        &self.monitor
    }

    pub fn ctrl_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    pub fn into_parts(self) -> (MonitorTransport<L>, C) {
        (self.monitor, self.ctrl)
    }
}

fn report(client: MacAddress, verdict: &Verdict) {
    match verdict.evidence {
        Evidence::AllZeroKey { iv, seq } => {
            info!(
                target: T_DETECT,
                %client, iv, seq,
                "all-zero key in use: client is vulnerable to (re)installation of an all-zero key in the 4-way handshake"
            );
            warn!(
                target: T_DETECT,
                %client,
                "all-zero key usage makes the other checks for this client unreliable"
            );
        }
        Evidence::IvReuse { iv, seq } => info!(
            target: T_DETECT,
            %client, iv, seq,
            "IV reuse: client is vulnerable to pairwise key reinstallation in the 4-way handshake"
        ),
        Evidence::NoResetIntervals(n) => info!(
            target: T_DETECT,
            %client,
            intervals = n,
            "no IV reset observed: client does not appear vulnerable to pairwise key reinstallation"
        ),
    }
}
