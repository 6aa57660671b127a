use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use krackscan_ctrl::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_UDP_PORT};
use krackscan_wireless::MacAddress;

use crate::client::{TimingPolicy, DEFAULT_PATCHED_AFTER, DEFAULT_RETRANSMIT_INTERVAL};
use crate::engine::{EngineOptions, DEFAULT_POLL_INTERVAL};
use crate::error::{DetectError, Result};

pub const DEFAULT_IFACE: &str = "wlan0";
pub const DEFAULT_ROOT_PATH: &str = "/var/lib/krackscan";
pub const DEFAULT_CTRL_DIR: &str = "hostapd_ctrl";
pub const SYSFS_NET: &str = "/sys/class/net";

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub iface: String,
    pub mon_iface: String,
    pub ap_mac: MacAddress,
    pub ctrl_path: String,
    pub ctrl_port: u16,
    pub ctrl_timeout: Duration,
    pub retransmit_interval: Duration,
    pub patched_after: u32,
    pub poll_interval: Duration,
    pub decrypt_payloads: bool,
    pub root_path: PathBuf,
}

impl DetectorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok(), Path::new(SYSFS_NET))
    }

    /// Build from an arbitrary variable source; `sysfs_net` is where
    /// interface addresses are looked up when no AP MAC is given.
    pub fn from_vars<F>(var: F, sysfs_net: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let iface = var("KRACKSCAN_IFACE").unwrap_or_else(|| DEFAULT_IFACE.to_string());
        let mon_iface = var("KRACKSCAN_MON_IFACE").unwrap_or_else(|| format!("{iface}mon"));

        let ap_mac = match var("KRACKSCAN_AP_MAC") {
            Some(value) => value
                .parse::<MacAddress>()
                .map_err(|e| DetectError::config(format!("KRACKSCAN_AP_MAC: {e}")))?,
            None => interface_mac(sysfs_net, &iface)?,
        };

        let ctrl_path =
            var("KRACKSCAN_CTRL_PATH").unwrap_or_else(|| format!("{DEFAULT_CTRL_DIR}/{iface}"));
        let ctrl_port = var("KRACKSCAN_CTRL_PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_UDP_PORT);
        let ctrl_timeout = var("KRACKSCAN_CTRL_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let retransmit_interval = var("KRACKSCAN_RETRANSMIT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRANSMIT_INTERVAL);
        let patched_after = var("KRACKSCAN_PATCHED_AFTER")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PATCHED_AFTER);
        let poll_interval = var("KRACKSCAN_POLL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let decrypt_payloads = var("KRACKSCAN_DECRYPT_PAYLOADS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let root_path = var("KRACKSCAN_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_PATH));

        Ok(Self {
            iface,
            mon_iface,
            ap_mac,
            ctrl_path,
            ctrl_port,
            ctrl_timeout,
            retransmit_interval,
            patched_after,
            poll_interval,
            decrypt_payloads,
            root_path,
        })
    }

    pub fn timing(&self) -> TimingPolicy {
        TimingPolicy {
            retransmit_interval: self.retransmit_interval,
            patched_after: self.patched_after,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            ap_mac: self.ap_mac,
            policy: self.timing(),
            poll_interval: self.poll_interval,
            decrypt_payloads: self.decrypt_payloads,
        }
    }
}

fn interface_mac(sysfs_net: &Path, iface: &str) -> Result<MacAddress> {
    let path = sysfs_net.join(iface).join("address");
    let content = fs::read_to_string(&path).map_err(|e| {
        DetectError::config(format!(
            "no KRACKSCAN_AP_MAC and cannot read {}: {}",
            path.display(),
            e
        ))
    })?;
    content
        .trim()
        .parse()
        .map_err(|e| DetectError::config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_explicit_mac() {
        let cfg = DetectorConfig::from_vars(
            vars(&[("KRACKSCAN_AP_MAC", "02:00:00:00:00:01")]),
            Path::new("/nonexistent"),
        )
        .unwrap();
        assert_eq!(cfg.iface, "wlan0");
        assert_eq!(cfg.mon_iface, "wlan0mon");
        assert_eq!(cfg.ctrl_path, "hostapd_ctrl/wlan0");
        assert_eq!(cfg.ctrl_port, 9877);
        assert_eq!(cfg.ctrl_timeout, Duration::from_secs(10));
        assert_eq!(cfg.timing(), TimingPolicy::default());
        assert!(!cfg.decrypt_payloads);
        assert_eq!(cfg.root_path, PathBuf::from("/var/lib/krackscan"));
    }

    #[test]
    fn mac_is_read_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let iface_dir = dir.path().join("wlan1");
        fs::create_dir_all(&iface_dir).unwrap();
        fs::write(iface_dir.join("address"), "0a:1b:2c:3d:4e:5f\n").unwrap();

        let cfg = DetectorConfig::from_vars(
            vars(&[("KRACKSCAN_IFACE", "wlan1"), ("KRACKSCAN_DECRYPT_PAYLOADS", "TRUE")]),
            dir.path(),
        )
        .unwrap();
        assert_eq!(cfg.ap_mac, MacAddress([0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]));
        assert_eq!(cfg.mon_iface, "wlan1mon");
        assert!(cfg.decrypt_payloads);
    }

    #[test]
    fn bad_mac_is_a_config_error() {
        let err = DetectorConfig::from_vars(
            vars(&[("KRACKSCAN_AP_MAC", "not-a-mac")]),
            Path::new("/nonexistent"),
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::Config(_)));

        let err = DetectorConfig::from_vars(vars(&[]), Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, DetectError::Config(_)));
    }

    #[test]
    fn numeric_overrides_and_fallbacks() {
        let cfg = DetectorConfig::from_vars(
            vars(&[
                ("KRACKSCAN_AP_MAC", "02:00:00:00:00:01"),
                ("KRACKSCAN_RETRANSMIT_SECS", "3"),
                ("KRACKSCAN_PATCHED_AFTER", "0"),
                ("KRACKSCAN_POLL_MS", "250"),
                ("KRACKSCAN_CTRL_PORT", "nope"),
            ]),
            Path::new("/nonexistent"),
        )
        .unwrap();
        assert_eq!(cfg.timing().progress_interval(), Duration::from_secs(7));
        assert_eq!(cfg.patched_after, 5);
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.ctrl_port, 9877);
    }
}
